pub mod artifact;
pub mod composer;
pub mod config;
pub mod delegation;
pub mod error;
pub mod handler;
pub mod handoff;
pub mod io;
pub mod library;
pub mod manifest;
pub mod paths;
pub mod types;
pub mod workspace;

pub use error::{LoomError, Result};
