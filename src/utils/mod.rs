//! Cross-cutting utilities: retry policy, file helpers and progress bars.

pub mod backoff;
pub mod command;
pub mod fs;
pub mod progress;

pub use backoff::RetryPolicy;
pub use progress::ProgressBar;
