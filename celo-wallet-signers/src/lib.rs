//! Provides a unified interface for signing celo transactions and messages.
//!
//! Every backend implements the two-operation [`Signer`] capability: signing
//! a prepared transaction payload and signing a personal message. Wallets
//! ([`WalletBase`], [`RemoteWallet`]) own a registry of address → signer
//! bindings and dispatch on the transaction's `from` address.
//!
//! Supported signers:
//! - Private key in memory ([`LocalSigner`])
//! - Ledger hardware device ([`ledger::LedgerSigner`])
//! - Azure Key Vault HSM ([`azure::AzureHsmSigner`])
//!
//! ```no_run
//! use celo_wallet_core::types::CeloTransactionRequest;
//! use celo_wallet_signers::LocalWallet;
//!
//! # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
//! let wallet = LocalWallet::new();
//! let sender =
//!     wallet.add_account("dcf2cbdd171a21c480aa7f53d77f31bb102282b3ff099c78e3118b37348c72f7")?;
//!
//! let tx = CeloTransactionRequest::pay(sender, 10000u64)
//!     .from(sender)
//!     .nonce(0)
//!     .gas(21000)
//!     .gas_price(1)
//!     .chain_id(42220u64);
//!
//! let signed = wallet.sign_transaction(&tx).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use celo_wallet_core::types::{RlpEncodedTx, Signature};

mod wallet;
pub use wallet::{Wallet, WalletBase, WalletError};

mod remote;
pub use remote::{AccountLoader, RemoteWallet, RemoteWalletError, INIT_TIMEOUT};

mod local;
pub use local::{LocalSigner, LocalSignerError, LocalWallet};

pub mod ledger;
pub use ledger::{AddressValidation, LedgerWallet};

pub mod azure;
pub use azure::{AzureHsmWallet, KeyVaultClientFactory};

/// Computes the value added to the raw recovery id when folding replay
/// protection into `v`, per
/// [EIP-155](https://github.com/ethereum/EIPs/blob/master/EIPS/eip-155.md).
///
/// A missing or zero chain id signs without replay protection, using the
/// legacy 'Electrum' base.
pub fn to_replay_protected_v(chain_id: Option<u64>) -> u64 {
    match chain_id {
        Some(chain_id) if chain_id != 0 => chain_id * 2 + 35,
        _ => 27,
    }
}

/// Trait for the signing backends bound into a wallet.
///
/// Implement this trait to support different signing modes, e.g. hardware
/// devices or remote HSMs. The transaction operation receives the full
/// encoded payload rather than just its digest, because hardware signers
/// re-derive what they display to the user from the payload bytes;
/// `add_to_v` carries the chain-aware recovery base from
/// [`to_replay_protected_v`].
#[async_trait]
pub trait Signer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Signs the prepared transaction payload, folding `add_to_v` into the
    /// recovery byte of the returned signature.
    async fn sign_transaction(
        &self,
        add_to_v: u64,
        encoded_tx: &RlpEncodedTx,
    ) -> Result<Signature, Self::Error>;

    /// Signs `data` following the personal-message prefix convention
    /// (EIP-191). The returned `v` uses the 27/28 notation.
    async fn sign_personal_message(&self, data: &[u8]) -> Result<Signature, Self::Error>;

    /// Identifier of the key material backing this signer: the raw private
    /// key for local signers, a derivation path for hardware devices, a key
    /// name for remote HSMs.
    fn native_key(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_protection_base() {
        assert_eq!(to_replay_protected_v(Some(1)), 37);
        assert_eq!(to_replay_protected_v(Some(44378)), 44378 * 2 + 35);
        // chain id zero falls back to the legacy base
        assert_eq!(to_replay_protected_v(Some(0)), 27);
        assert_eq!(to_replay_protected_v(None), 27);
    }
}
