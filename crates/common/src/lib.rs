//! Shared types for the auth API client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, read_secret_file};
