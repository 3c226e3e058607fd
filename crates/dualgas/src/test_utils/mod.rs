//! Test utilities for the dual-path pipeline.

mod executor;
mod keys;
mod txs;

pub use executor::*;
pub use keys::*;
pub use txs::*;
