pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{RelayError, RelayResult};
pub use models::*;
pub use traits::*;
