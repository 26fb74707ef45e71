//! Configuration, paths and logging setup for tokenkeeper binaries.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
