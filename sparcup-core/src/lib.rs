pub mod config;
pub mod conform;
pub mod duplicate;
pub mod error;
pub mod expand;
pub mod hierarchy;
pub mod manifest;
pub mod memory;
pub mod mirror;
pub mod orchestrate;
pub mod path_safety;
pub mod progress;
pub mod remote;
pub mod resolve;
pub mod wait;
