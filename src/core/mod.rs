//! Core types shared across plugreg: the whole-run error taxonomy and its
//! user-facing rendering.

pub mod error;

pub use error::{ErrorContext, PlugregError, format_error_chain, user_friendly_error};
