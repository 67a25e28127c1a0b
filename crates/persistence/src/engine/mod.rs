//! Backend-independent query semantics.
//!
//! - [`operators`] - what each filter operator means over one value
//! - [`evaluator`] - the in-memory execution strategy
//! - [`search`] - substring matching and deterministic scoring
//! - [`pagination`] - page arithmetic shared by every backend
//!
//! Everything here is a pure function of its arguments and safe to call
//! concurrently.

pub mod evaluator;
pub mod operators;
pub mod pagination;
pub mod search;

pub use evaluator::{Evaluator, base_order, evaluate};
pub use operators::{CompiledFilter, check_kind, compare_values};
pub use pagination::{PageWindow, calculate, total_pages};
pub use search::Searcher;
