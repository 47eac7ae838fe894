//! Request handlers.

pub mod convert;
pub mod health;

pub use convert::*;
pub use health::*;
