//! The generated registry file: reading the current one and writing the
//! next one.

pub mod current;
pub mod emitter;

pub use current::LiveRegistry;
pub use emitter::RegistryEmitter;
