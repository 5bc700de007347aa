pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod types;

pub use config::PaperboyConfig;
pub use error::CoreError;
pub use notify::{AdminNotifier, LogNotifier};
pub use types::Mode;
