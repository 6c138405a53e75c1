//! colscope CLI library.
//!
//! This module exposes internal types for testing purposes.
//! The main entry point is the `colscope` binary.

pub mod cli;
pub mod input;
pub mod schema;

pub use cli::Args;
