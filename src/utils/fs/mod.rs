//! File system helpers.
//!
//! - [`atomic`]: write-then-rename for files that must never be seen half written
//! - [`formats`]: plain overwrite of text and JSON files

pub mod atomic;
pub mod formats;

pub use atomic::{atomic_write, safe_write};
pub use formats::{read_json_file, write_json_file, write_text_file};
