pub mod config;
pub mod core;
pub mod inputs;
pub mod utils;

pub use crate::core::{detect_events, ClusterLayout, Detection};
