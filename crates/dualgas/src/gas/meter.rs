use tracing::trace;

use crate::AdmissionError;

/// A meter of the gas consumed by one transaction.
///
/// The consumed amount only grows between resets and never exceeds the limit: a consumption
/// that would cross the limit fails with [`AdmissionError::OutOfGas`] and leaves the meter
/// untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasMeter {
    consumed: u64,
    limit: u64,
}

impl GasMeter {
    /// Creates a meter with the given limit.
    pub const fn new(limit: u64) -> Self {
        Self { consumed: 0, limit }
    }

    /// Consumes `amount` gas for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::OutOfGas`] with the limit as `gas_wanted` and the total that
    /// would have been consumed as `gas_used` when `consumed + amount > limit`.
    pub fn consume(&mut self, amount: u64, descriptor: &'static str) -> Result<(), AdmissionError> {
        let total = self.consumed.saturating_add(amount);
        if total > self.limit {
            return Err(AdmissionError::OutOfGas {
                descriptor,
                gas_wanted: self.limit,
                gas_used: total,
            });
        }
        trace!(target: "dualgas::gas", amount, total, descriptor, "consume gas");
        self.consumed = total;
        Ok(())
    }

    /// Resets the consumed gas to zero with a new limit.
    pub fn reset(&mut self, limit: u64) {
        self.consumed = 0;
        self.limit = limit;
    }

    /// Replaces the consumed gas with an externally metered amount, clamped to the limit. Used
    /// to adopt the EVM's own `gas_used` after reconciliation.
    pub fn set_consumed(&mut self, gas_used: u64) {
        self.consumed = gas_used.min(self.limit);
    }

    /// Returns the gas left before the limit.
    pub const fn remaining(&self) -> u64 {
        self.limit - self.consumed
    }

    /// Returns the consumed gas.
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Returns the limit.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns `true` if no gas is left.
    pub const fn is_exhausted(&self) -> bool {
        self.consumed >= self.limit
    }
}
