pub mod credentials;
pub mod gas;
pub mod logger;
pub mod retry;

pub use credentials::{CredentialSource, FailedKeys};
pub use logger::setup_logger;
pub use retry::{ErrorTally, RetryGovernor, RetryPolicy, SharedTally};
