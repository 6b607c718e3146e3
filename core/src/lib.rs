pub mod action;
pub mod build;
pub mod config;
pub mod serdable;
pub mod style;
pub mod testing;

pub use crate::config::Config;
