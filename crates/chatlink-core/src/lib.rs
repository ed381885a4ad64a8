pub mod config;
pub mod display;
pub mod errors;
pub mod format;
pub mod protocol;
pub mod types;

pub use config::{ClientConfig, EndpointConfig, Framing};
pub use errors::{ClientError, ConfigError, UploadError};
pub use types::*;
