pub mod models;
pub mod pii;

pub use models::events::JourneyEvent;
pub use pii::Masked;
