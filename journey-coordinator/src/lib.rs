pub mod coordinator;
pub mod mutation;
pub mod retry;

pub use coordinator::{CoordinatorError, JourneyCoordinator, UpdateReceipt};
pub use mutation::JourneyMutation;
pub use retry::RetryPolicy;
