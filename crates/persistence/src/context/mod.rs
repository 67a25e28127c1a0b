//! Call context for storage operations.
//!
//! Every operation takes a [`CallContext`]. It carries the cancellation token
//! and deadline that relational backends honor while statements run, plus the
//! tenant and correlation identifiers recorded on tracing spans.

mod call;
mod tenant;

pub use call::CallContext;
pub use tenant::{DEFAULT_TENANT, TenantId};
