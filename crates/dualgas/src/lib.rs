//! Dual-path transaction admission and fee market.
//!
//! A block processor that admits native (account-based, bandwidth-priced) transactions and
//! EVM-style (EIP-1559) transactions in one block cycle, keeping a single notion of gas across
//! both execution models.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod ante;
pub use ante::*;

mod block;
pub use block::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod estimate;

mod executor;
pub use executor::*;

mod fee_market;
pub use fee_market::*;

mod gas;
pub use gas::*;

mod precompiles;
pub use precompiles::*;

mod reconcile;
pub use reconcile::*;

mod state;
pub use state::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;

