//! Client-side construction, balancing and submission of Cardano
//! transactions.
//!
//! Describe the economic effect you want (spend these utxos, pay these
//! addresses, run these scripts, mint these assets) and
//! [`TransactionBuilder::build`] returns a fully-formed transaction:
//! balanced, fee-paid, change-allocated, with collateral and script
//! execution budgets in place, ready for signing and submission.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use siphon::{BlockfrostContext, Network, TransactionBuilder};
//! use siphon::primitives::{Output, Value};
//! use pallas::ledger::addresses::Address;
//!
//! let context = BlockfrostContext::new(
//!     "project-id",
//!     Network::Mainnet,
//!     "https://cardano-mainnet.blockfrost.io/api/v0",
//! );
//!
//! let sender = Address::from_bech32("addr1...")?;
//! let receiver = Address::from_bech32("addr1...")?;
//!
//! let mut builder = TransactionBuilder::new(context.clone());
//! builder.add_input_address(sender.clone());
//! builder.add_output(
//!     Output::new(receiver, Value::from_lovelace(3_000_000)),
//!     None,
//!     false,
//! );
//!
//! let tx = builder.build(Some(&sender), false, None).await?;
//! tx.submit(&context).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod params;
pub mod primitives;
pub mod selection;
pub mod transaction;

pub use builder::{TransactionBuilder, TxBuilderError};
pub use context::{BlockfrostContext, ChainContext, ContextError};
pub use params::{GenesisParameters, Network, ProtocolParameters};
pub use selection::{LargestFirst, RandomImprove, Selection, UtxoSelector};
pub use transaction::{PendingTransaction, TxSigner};
