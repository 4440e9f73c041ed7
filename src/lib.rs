//! # celo-wallet
//!
//! A Rust library for signing celo transactions with pluggable key backends:
//! in-memory private keys, Ledger hardware devices and Azure Key Vault HSMs,
//! all behind one wallet interface, plus a provider shim that signs locally
//! for wallet-held accounts and forwards everything else to the node.
//!
//! The workspace is split into three member crates, re-exported here under
//! shorter names:
//!
//! - [`core`]: chain data types, RLP transaction encoding, signature
//!   recovery, EIP-712 hashing and address utilities.
//! - [`signers`]: the `Signer` capability, the concrete backends, and the
//!   `WalletBase`/`RemoteWallet` registries.
//! - [`providers`]: JSON-RPC transports and the `CeloProvider` shim.
//!
//! ```no_run
//! use celo_wallet::prelude::*;
//!
//! # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
//! let wallet = LocalWallet::new();
//! let sender = wallet.add_account(
//!     "0xdcf2cbdd171a21c480aa7f53d77f31bb102282b3ff099c78e3118b37348c72f7",
//! )?;
//!
//! let provider = CeloProvider::new(Http::from_str("https://forno.celo.org")?, wallet);
//!
//! // `from` is wallet-held, so this signs locally and submits the raw tx
//! let tx = CeloTransactionRequest::pay(sender, 1_000u64).from(sender);
//! let tx_hash: celo_wallet::core::types::TxHash =
//!     provider.request("eth_sendTransaction", [tx]).await?;
//! # Ok(())
//! # }
//! ```

pub use celo_wallet_core as core;
pub use celo_wallet_providers as providers;
pub use celo_wallet_signers as signers;

/// Easy imports of frequently used types and traits.
pub mod prelude {
    pub use super::core::types::*;

    pub use super::signers::*;

    pub use super::providers::*;

    pub use std::str::FromStr;
}
