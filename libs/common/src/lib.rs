//! `VoltageEMS` basic library for the RTU tools
//!
//! Provides basic functions shared by the RTU library and tools, including:
//! - logging functions
//! - hex dump formatting
//! - configuration value fallback

pub mod config_loader;
pub mod hex;
pub mod logging;
