//! Provider fallback scheduling: fixed-order rotation over the reasoning
//! backends with per-provider cooldowns and a periodic full reset.

pub mod scheduler;
pub mod status;

pub use scheduler::*;
pub use status::*;
