pub mod config;
pub mod detection;
pub mod error;
pub mod sample;

pub use config::Config;
pub use detection::*;
pub use error::*;
pub use sample::*;
