//! Garde validation utilities.

mod validate;

pub use validate::*;
