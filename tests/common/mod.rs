//! Test utilities shared by the integration and end-to-end suites.
//!
//! - `fixtures`: Parameter files, device images and state paths on disk

pub mod fixtures;

use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
