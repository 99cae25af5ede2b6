//! Command implementations.

pub mod compile;
pub mod keygen;
pub mod push;
pub mod status;
