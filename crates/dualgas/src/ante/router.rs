use tracing::debug;

use super::{evm_ante_chain, native_ante_chain, AnteChain, AnteContext};
use crate::{AdmissionError, AnteParams, ExtensionOption, Tx};

/// The admission chain a transaction is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    /// The native chain.
    Native,
    /// The EVM chain.
    Evm,
}

/// A transaction together with its routing decision, which never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutedTx<'a> {
    /// Routed to the native chain.
    Native(&'a Tx),
    /// Routed to the EVM chain.
    Evm(&'a Tx),
}

impl<'a> RoutedTx<'a> {
    /// Returns the chain kind.
    pub const fn kind(&self) -> ChainKind {
        match self {
            Self::Native(_) => ChainKind::Native,
            Self::Evm(_) => ChainKind::Evm,
        }
    }

    /// Returns the transaction.
    pub const fn tx(&self) -> &'a Tx {
        match self {
            Self::Native(tx) | Self::Evm(tx) => tx,
        }
    }
}

/// Routes transactions to the native or the EVM admission chain.
#[derive(Debug)]
pub struct TxRouter {
    native: AnteChain,
    evm: AnteChain,
}

impl TxRouter {
    /// Creates a router over the given chains.
    pub const fn new(native: AnteChain, evm: AnteChain) -> Self {
        Self { native, evm }
    }

    /// Creates a router over the standard chains configured by `params`.
    pub fn from_params(params: &AnteParams, block_gas_limit: u64) -> Self {
        Self::new(native_ante_chain(params, block_gas_limit), evm_ante_chain())
    }

    /// Decides the chain of `tx` from its first extension option. Further options are not
    /// consulted.
    pub fn route<'a>(&self, tx: &'a Tx) -> Result<RoutedTx<'a>, AdmissionError> {
        let routed = match tx.extension_options.first() {
            Some(ExtensionOption::EthereumTx) => RoutedTx::Evm(tx),
            Some(ExtensionOption::DynamicFee { .. }) => RoutedTx::Native(tx),
            Some(ExtensionOption::Unknown { type_url }) => {
                return Err(AdmissionError::RejectedUnknownExtension { type_url: type_url.clone() })
            }
            None => {
                return Err(AdmissionError::RejectedUnknownExtension { type_url: String::new() })
            }
        };
        Ok(routed)
    }

    /// Returns the chain for `kind`.
    pub const fn chain(&self, kind: ChainKind) -> &AnteChain {
        match kind {
            ChainKind::Native => &self.native,
            ChainKind::Evm => &self.evm,
        }
    }

    /// Routes `tx` and runs the selected chain.
    pub fn admit(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<ChainKind, AdmissionError> {
        let routed = self.route(tx).inspect_err(|err| {
            debug!(
                target: "dualgas::router",
                tx_hash = %ctx.tx_hash,
                %err,
                "Unroutable transaction"
            );
        })?;
        let kind = routed.kind();
        debug!(target: "dualgas::router", tx_hash = %ctx.tx_hash, ?kind, "Routed transaction");
        self.chain(kind).handle(ctx, routed.tx())?;
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EvmTx, NativeTx, TxBody};
    use alloy_primitives::U256;

    fn router() -> TxRouter {
        TxRouter::from_params(&AnteParams::default(), 20_000_000)
    }

    #[test]
    fn test_route_by_first_extension_only() {
        let mut tx = Tx::evm(EvmTx::default());
        tx.extension_options.push(ExtensionOption::Unknown { type_url: "/x".into() });
        assert_eq!(router().route(&tx).unwrap().kind(), ChainKind::Evm);

        let tx = Tx::native(NativeTx::default(), U256::ZERO);
        assert_eq!(router().route(&tx).unwrap().kind(), ChainKind::Native);
    }

    #[test]
    fn test_route_rejects_missing_or_unknown() {
        let tx = Tx { body: TxBody::Evm(EvmTx::default()), extension_options: vec![] };
        assert!(matches!(
            router().route(&tx),
            Err(AdmissionError::RejectedUnknownExtension { type_url }) if type_url.is_empty()
        ));

        let tx = Tx {
            body: TxBody::Native(NativeTx::default()),
            extension_options: vec![
                ExtensionOption::Unknown { type_url: "/foo.Bar".into() },
                ExtensionOption::EthereumTx,
            ],
        };
        assert!(matches!(
            router().route(&tx),
            Err(AdmissionError::RejectedUnknownExtension { type_url }) if type_url == "/foo.Bar"
        ));
    }

    #[test]
    fn test_standard_chains() {
        let router = router();
        assert_eq!(router.chain(ChainKind::Evm).len(), 2);
        assert_eq!(router.chain(ChainKind::Native).len(), 15);
    }
}
