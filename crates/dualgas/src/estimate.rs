//! Gas estimation.
//!
//! Estimation probes run the full admission and execution pipeline in simulation mode on
//! throwaway overlays, so they never touch the committed state, the accumulator or the fee
//! market and the same query always yields the same answer.

use tracing::debug;

use crate::{
    AccountState, AdmissionError, BlockProcessor, EvmExecutor, FeeStateStore, NativeMsgExecutor,
    StateOverlay, Tx, TxBody, TxStatus,
};

impl<S, E, N, F> BlockProcessor<S, E, N, F>
where
    S: AccountState,
    E: EvmExecutor,
    N: NativeMsgExecutor,
    F: FeeStateStore,
{
    /// Runs `tx` against the committed state without changing it and returns the gas it was
    /// charged. Signatures are charged but not verified.
    pub fn simulate(&self, tx: &Tx) -> Result<u64, AdmissionError> {
        let admitted = self.admit(self.state(), tx, true)?;
        let mut scratch = StateOverlay::new(self.state());
        admitted.changes.apply(&mut scratch);
        let executed = self.execute(&scratch, tx, admitted.kind, &admitted.outcome);
        match executed.status {
            TxStatus::Success => Ok(executed.gas_used),
            TxStatus::Failed(err) | TxStatus::Rejected(err) => Err(err),
        }
    }

    /// Returns the lowest gas limit in `[intrinsic_gas, tx.gas_limit]` with which `tx`
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns the failure of the probe at `tx.gas_limit` when even the cap is not enough.
    pub fn estimate_gas(&self, tx: &Tx) -> Result<u64, AdmissionError> {
        let cap = tx.gas_limit();
        let floor = self.intrinsic_gas(tx).min(cap);
        let probe = |gas_limit| self.simulate(&with_gas_limit(tx, gas_limit));

        probe(cap)?;
        if probe(floor).is_ok() {
            return Ok(floor);
        }

        // `lo` always fails, `hi` always succeeds
        let (mut lo, mut hi) = (floor, cap);
        let mut probes = 2;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if probe(mid).is_ok() {
                hi = mid;
            } else {
                lo = mid;
            }
            probes += 1;
        }
        debug!(
            target: "dualgas::estimate",
            tx_hash = %tx.hash(),
            estimate = hi,
            probes,
            "Estimated gas"
        );
        Ok(hi)
    }

    /// The gas no execution of `tx` can go below.
    pub fn intrinsic_gas(&self, tx: &Tx) -> u64 {
        match &tx.body {
            TxBody::Evm(evm) => evm.intrinsic_gas(),
            TxBody::Native(native) => {
                let params = &self.config().ante;
                let size = params.tx_size_cost_per_byte.saturating_mul(tx.encode().len() as u64);
                let sigs = params
                    .sig_verify_cost_secp256k1
                    .saturating_mul(native.signer_infos.len() as u64);
                size.saturating_add(sigs)
            }
        }
    }
}

fn with_gas_limit(tx: &Tx, gas_limit: u64) -> Tx {
    let mut tx = tx.clone();
    match &mut tx.body {
        TxBody::Native(native) => native.fee.gas_limit = gas_limit,
        TxBody::Evm(evm) => evm.gas_limit = gas_limit,
    }
    tx
}
