//! Invocation error taxonomy
//!
//! Callers can always distinguish "no endpoint", "circuit open", "network
//! error" and "application error" through [`Kind`] predicates without
//! parsing messages.

pub mod classification;
pub mod types;

pub use types::{Error, Kind, Result};
