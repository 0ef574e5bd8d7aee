pub mod commands;
pub mod config;
pub mod log;
pub mod markers;
pub mod types;
pub mod validation;

pub use commands::*;
pub use config::*;
pub use log::*;
pub use markers::*;
pub use types::*;
pub use validation::*;
