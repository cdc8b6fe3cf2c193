/// Retry System
///
/// Generic exponential-backoff executor used by every remote call: identity
/// lookups, team applies, and connectivity probes.

pub mod executor;
pub mod policy;

pub use executor::{execute, RetryOutcome, RetryResult};
pub use policy::RetryPolicy;
