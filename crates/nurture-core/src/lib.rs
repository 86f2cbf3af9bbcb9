pub mod config;
pub mod error;
pub mod ids;
pub mod types;
pub mod validate;

pub use config::NurtureConfig;
pub use error::{NurtureError, Result};
pub use types::*;
