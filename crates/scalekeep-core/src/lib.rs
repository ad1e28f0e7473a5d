pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::{parse_duration, ScalekeepConfig};
pub use error::{ConfigError, ConfigResult};
pub use policy::{PolicySet, ScalingPolicy};
pub use types::*;
