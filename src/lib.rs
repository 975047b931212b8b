pub mod catalog;
pub mod commands;
pub mod config;
pub mod dump;
pub mod error;
pub mod lock;
pub mod pg;
pub mod retention;
pub mod scheduler;
pub mod verify;

pub use error::{Error, Result};
