//! Shared helpers
//!
//! - **[`macros`]**: state-name `Display`/`FromStr` generation
//! - **[`serde`]**: duration serialization for config files

#[macro_use]
pub mod macros;
pub mod serde;

pub use self::serde::duration_millis;
