//! Job admission, execution and delivery.

pub mod dispatcher;
pub mod executor;
pub mod gate;
pub mod invocation;
pub mod rate_limiter;
pub mod service;

pub use dispatcher::{Delivery, Reply, ReplyFile, ResultDispatcher};
pub use executor::{Artifact, JobExecutor};
pub use gate::{ConcurrencyGate, GatePermit};
pub use invocation::plan_invocation;
pub use rate_limiter::{Admission, RateLimiterConfig, RateLimiterManager};
pub use service::{JobOutcome, JobReport, JobService};
