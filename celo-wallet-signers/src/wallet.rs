//! The wallet registry: one signer per address, uniform signing operations.

use crate::{to_replay_protected_v, Signer};
use async_trait::async_trait;
use celo_wallet_core::types::{
    Address, CeloTransactionRequest, Eip712Error, EncodedTransaction, TypedData,
};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use thiserror::Error;
use tracing::debug;

/// Errors a wallet can surface, generic over the bound signer's own error.
#[derive(Debug, Error)]
pub enum WalletError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Signing was requested for an address with no registered signer
    #[error("could not find address {0:?}")]
    AccountNotFound(Address),
    /// The transaction carries no `from` address to dispatch on
    #[error("transaction has no from address")]
    MissingFrom,
    /// `sign_personal_message` payloads must be 0x-prefixed hex
    #[error("expected personal message data to be a 0x-prefixed hex string")]
    InvalidHexData,
    /// The typed-data object could not be hashed
    #[error(transparent)]
    TypedData(#[from] Eip712Error),
    /// A remote wallet accessor was used before discovery completed
    #[error("wallet needs to be initialized first")]
    NotInitialized,
    /// Waiting for an in-flight discovery exceeded the configured bound
    #[error("wallet initialization took too long, ensure the wallet signer is available")]
    InitTimeout,
    /// The underlying signer failed
    #[error(transparent)]
    Signer(E),
}

/// The uniform wallet surface the provider shim (and other consumers)
/// program against, implemented by both [`WalletBase`] and
/// [`RemoteWallet`](crate::RemoteWallet).
#[async_trait]
pub trait Wallet: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The registered accounts, in registration/discovery order.
    fn accounts(&self) -> Result<Vec<Address>, Self::Error>;

    /// Whether `address` has a registered signer.
    fn has_account(&self, address: &Address) -> Result<bool, Self::Error>;

    /// Signs the transaction with the signer bound to its `from` address and
    /// returns the final encoded transaction.
    async fn sign_transaction(
        &self,
        tx: &CeloTransactionRequest,
    ) -> Result<EncodedTransaction, Self::Error>;

    /// Signs a personal message given as a 0x-prefixed hex payload.
    /// Returns the signature as a 0x-prefixed r ‖ s ‖ v hex string.
    async fn sign_personal_message(
        &self,
        address: Address,
        data: &str,
    ) -> Result<String, Self::Error>;

    /// Signs an EIP-712 typed-data object.
    /// Returns the signature as a 0x-prefixed r ‖ s ‖ v hex string.
    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<String, Self::Error>;
}

struct AccountRegistry<S> {
    // `order` preserves registration order for `get_accounts`; the map holds
    // the actual bindings
    order: Vec<Address>,
    signers: HashMap<Address, Arc<S>>,
}

impl<S> Default for AccountRegistry<S> {
    fn default() -> Self {
        Self { order: Vec::new(), signers: HashMap::new() }
    }
}

/// A collection of address → [`Signer`] bindings with uniform signing
/// operations dispatched by the transaction's `from` field.
///
/// Concrete wallets populate the registry through [`add_signer`]
/// (directly, as [`LocalWallet`](crate::LocalWallet) does, or from an async
/// discovery pass, as the remote wallets do).
///
/// [`add_signer`]: WalletBase::add_signer
pub struct WalletBase<S> {
    accounts: RwLock<AccountRegistry<S>>,
}

impl<S> Default for WalletBase<S> {
    fn default() -> Self {
        Self::new()
    }
}

// signers may hold key material, so only the addresses are printed
impl<S> std::fmt::Debug for WalletBase<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletBase").field("accounts", &self.registry().order).finish()
    }
}

impl<S> WalletBase<S> {
    /// Creates a wallet with no registered accounts.
    pub fn new() -> Self {
        Self { accounts: RwLock::new(AccountRegistry::default()) }
    }

    fn registry(&self) -> std::sync::RwLockReadGuard<'_, AccountRegistry<S>> {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `signer` to `address`. Re-adding an already registered address
    /// is a no-op, not an overwrite; returns whether the binding was new.
    pub fn add_signer(&self, address: Address, signer: S) -> bool {
        let mut registry = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if registry.signers.contains_key(&address) {
            return false
        }
        registry.order.push(address);
        registry.signers.insert(address, Arc::new(signer));
        true
    }

    /// Gets a list of accounts that have been registered, in registration
    /// order.
    pub fn get_accounts(&self) -> Vec<Address> {
        self.registry().order.clone()
    }

    /// Returns true if the account has been registered.
    pub fn has_account(&self, address: &Address) -> bool {
        self.registry().signers.contains_key(address)
    }
}

impl<S: Signer> WalletBase<S> {
    fn signer_for(&self, address: &Address) -> Result<Arc<S>, WalletError<S::Error>> {
        self.registry()
            .signers
            .get(address)
            .cloned()
            .ok_or(WalletError::AccountNotFound(*address))
    }

    /// Signs the transaction with the signer bound to its `from` address.
    pub async fn sign_transaction(
        &self,
        tx: &CeloTransactionRequest,
    ) -> Result<EncodedTransaction, WalletError<S::Error>> {
        let from = tx.from.ok_or(WalletError::MissingFrom)?;
        let signer = self.signer_for(&from)?;

        let encoded = tx.encode_for_signing();
        let add_to_v = to_replay_protected_v(tx.replay_chain_id().map(|id| id.as_u64()));
        debug!(from = ?from, add_to_v, "signing transaction");

        let signature =
            signer.sign_transaction(add_to_v, &encoded).await.map_err(WalletError::Signer)?;
        Ok(encoded.encode_with_signature(signature))
    }

    /// Signs a personal message with the signer bound to `address`.
    ///
    /// `data` must be a well-formed 0x-prefixed hex string; this is checked
    /// before any signer I/O is attempted.
    pub async fn sign_personal_message(
        &self,
        address: Address,
        data: &str,
    ) -> Result<String, WalletError<S::Error>> {
        let payload = decode_hex_payload(data).ok_or(WalletError::InvalidHexData)?;
        let signer = self.signer_for(&address)?;

        let signature =
            signer.sign_personal_message(&payload).await.map_err(WalletError::Signer)?;
        Ok(signature.to_hex())
    }

    /// Signs an EIP-712 typed-data object with the signer bound to `address`.
    ///
    /// The typed-data digest is routed through the signer's personal-message
    /// path, so hardware devices confirm it like any other message.
    pub async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<String, WalletError<S::Error>> {
        let digest = typed_data.encode_eip712()?;
        let signer = self.signer_for(&address)?;

        let signature =
            signer.sign_personal_message(&digest).await.map_err(WalletError::Signer)?;
        Ok(signature.to_hex())
    }
}

#[async_trait]
impl<S: Signer + 'static> Wallet for WalletBase<S> {
    type Error = WalletError<S::Error>;

    fn accounts(&self) -> Result<Vec<Address>, Self::Error> {
        Ok(self.get_accounts())
    }

    fn has_account(&self, address: &Address) -> Result<bool, Self::Error> {
        Ok(WalletBase::has_account(self, address))
    }

    async fn sign_transaction(
        &self,
        tx: &CeloTransactionRequest,
    ) -> Result<EncodedTransaction, Self::Error> {
        WalletBase::sign_transaction(self, tx).await
    }

    async fn sign_personal_message(
        &self,
        address: Address,
        data: &str,
    ) -> Result<String, Self::Error> {
        WalletBase::sign_personal_message(self, address, data).await
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<String, Self::Error> {
        WalletBase::sign_typed_data(self, address, typed_data).await
    }
}

fn decode_hex_payload(data: &str) -> Option<Vec<u8>> {
    let stripped = data.strip_prefix("0x")?;
    hex::decode(stripped).ok()
}

#[cfg(test)]
mod tests {
    use super::decode_hex_payload;

    #[test]
    fn hex_payload_guard() {
        assert_eq!(decode_hex_payload("0xdeadbeef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(decode_hex_payload("0x"), Some(vec![]));
        assert!(decode_hex_payload("deadbeef").is_none());
        assert!(decode_hex_payload("0xzz").is_none());
        assert!(decode_hex_payload("hello").is_none());
    }
}
