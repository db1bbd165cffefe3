pub mod action;
pub mod config;
pub mod error;
pub mod io;
pub mod objects;
pub mod prompt;
pub mod render;
pub mod state;
pub mod store;

pub use error::{CoreError, Result};
