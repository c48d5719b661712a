//! Core types, persistence port, and retry primitives for the presence engine.

pub mod error;
pub mod object;
pub mod retention;
pub mod retry;
pub mod storage;

pub use error::{Error, Result};
pub use object::*;
pub use retention::*;
pub use storage::*;
