//! Test infrastructure for the persistence layer.
//!
//! Every backend runs the same scenarios against the same fixtures, so the
//! backends are held to identical results.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;
pub mod scenarios;

pub use assertions::*;
pub use fixtures::*;

/// Installs a test-writer subscriber once per binary. Set `RUST_LOG` to see
/// the generated SQL.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Expands to one `#[tokio::test]` per named scenario, each on a fresh
/// repository built by `$make`.
macro_rules! scenario_tests {
    ($make:path; $($scenario:ident),* $(,)?) => {
        $(
            #[tokio::test]
            async fn $scenario() {
                crate::common::init_tracing();
                let repo = $make().await;
                crate::common::scenarios::$scenario(&repo).await;
            }
        )*
    };
}

pub(crate) use scenario_tests;
