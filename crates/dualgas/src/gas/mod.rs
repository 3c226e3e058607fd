//! Gas accounting shared by both execution paths.
//!
//! - [`GasMeter`] tracks the gas of a single transaction against its limit.
//! - [`BlockGasAccumulator`] aggregates the gas wanted by every admitted transaction of a block
//!   and feeds the fee market update at the block boundary.

mod accumulator;
mod meter;

pub use accumulator::*;
pub use meter::*;
