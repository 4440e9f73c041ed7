//! Azure Key Vault HSM wallet support.

mod client;
pub use client::{
    AzureKeyVaultClient, KeyVaultClientFactory, KeyVaultService, VaultError, VaultKey,
};

mod signer;
pub use signer::AzureHsmSigner;

use crate::{AccountLoader, RemoteWallet, RemoteWalletError, WalletError};
use async_trait::async_trait;
use celo_wallet_core::{types::Address, utils::public_key_to_address};
use std::sync::Arc;
use tracing::debug;

/// Discovers one signer per secp256k1 key held in the vault.
pub struct AzureAccountLoader<K> {
    client: Arc<AzureKeyVaultClient<K>>,
}

impl<K: KeyVaultService> AzureAccountLoader<K> {
    async fn address_for(&self, key_name: &str) -> Result<Address, VaultError> {
        let public_key = self.client.get_public_key(key_name).await?;
        Ok(public_key_to_address(&public_key))
    }
}

#[async_trait]
impl<K: KeyVaultService + 'static> AccountLoader for AzureAccountLoader<K> {
    type Signer = AzureHsmSigner<K>;

    async fn load_account_signers(
        &self,
    ) -> Result<Vec<(Address, AzureHsmSigner<K>)>, VaultError> {
        let keys = self.client.get_keys().await?;
        debug!(vault = self.client.vault_name(), keys = keys.len(), "listing vault keys");

        let mut signers = Vec::with_capacity(keys.len());
        for key_name in keys {
            match self.address_for(&key_name).await {
                Ok(address) => signers
                    .push((address, AzureHsmSigner::new(Arc::clone(&self.client), key_name))),
                // safely ignore keys on other curves; they can never sign
                Err(VaultError::InvalidPublicKey(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(signers)
    }
}

/// A remote wallet over HSM-held keys in one Azure Key Vault.
pub type AzureHsmWallet<K> = RemoteWallet<AzureAccountLoader<K>>;

impl<K: KeyVaultService + 'static> AzureHsmWallet<K> {
    /// Creates an uninitialized wallet talking to `vault_name` through the
    /// given service binding.
    pub fn from_service(service: K, vault_name: impl Into<String>) -> Self {
        Self::from_client(Arc::new(AzureKeyVaultClient::new(service, vault_name)))
    }

    /// Creates an uninitialized wallet over a shared vault client, typically
    /// obtained from a [`KeyVaultClientFactory`].
    pub fn from_client(client: Arc<AzureKeyVaultClient<K>>) -> Self {
        RemoteWallet::new(AzureAccountLoader { client })
    }

    /// Returns the address controlled by the given vault key.
    ///
    /// Useful for initially getting the `from` field given a key name,
    /// without running full discovery.
    pub async fn get_address_from_key_name(
        &self,
        key_name: &str,
    ) -> Result<Address, RemoteWalletError<AzureAccountLoader<K>>> {
        self.loader().address_for(key_name).await.map_err(WalletError::Signer)
    }
}
