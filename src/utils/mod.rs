pub mod ci;
pub mod config;

pub use ci::CiInfo;
pub use config::{Config, EnvSnapshot};
