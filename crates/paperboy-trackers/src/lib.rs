pub mod delivery;
pub mod execution;
pub mod failure;
pub mod gate;

pub use delivery::DeliveryTracker;
pub use execution::ExecutionTracker;
pub use failure::FailureTracker;
pub use gate::{check_failure_limit, check_idempotency, record_failure, RunGate};
