//! Heimdall daemon crate: bot registry, service facade, drain-cycle
//! executor and the polling service loop.

pub mod bundle;
pub mod daemon;
pub mod executor;
pub mod registry;
pub mod service;

pub use bundle::*;
pub use daemon::*;
pub use executor::*;
pub use registry::*;
pub use service::*;
