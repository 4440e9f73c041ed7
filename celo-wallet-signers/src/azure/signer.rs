//! Signs with a key held in an Azure Key Vault HSM.

use super::client::{AzureKeyVaultClient, KeyVaultService, VaultError};
use crate::Signer;
use async_trait::async_trait;
use celo_wallet_core::{
    types::{RlpEncodedTx, Signature},
    utils::hash_message,
};
use std::sync::Arc;

/// Delegates signing to a remote HSM key.
///
/// The HSM has no chain-id concept and returns a recovery id in `{0, 1}`;
/// this signer adds the appropriate base on top: the chain-aware `add_to_v`
/// for transactions, 27 for personal messages.
#[derive(Clone)]
pub struct AzureHsmSigner<K> {
    client: Arc<AzureKeyVaultClient<K>>,
    key_name: String,
}

impl<K> AzureHsmSigner<K> {
    pub fn new(client: Arc<AzureKeyVaultClient<K>>, key_name: impl Into<String>) -> Self {
        Self { client, key_name: key_name.into() }
    }
}

impl<K> std::fmt::Debug for AzureHsmSigner<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureHsmSigner").field("key_name", &self.key_name).finish()
    }
}

#[async_trait]
impl<K: KeyVaultService> Signer for AzureHsmSigner<K> {
    type Error = VaultError;

    async fn sign_transaction(
        &self,
        add_to_v: u64,
        encoded_tx: &RlpEncodedTx,
    ) -> Result<Signature, Self::Error> {
        let mut signature =
            self.client.sign_message(encoded_tx.sighash(), &self.key_name).await?;
        signature.v += add_to_v;
        Ok(signature)
    }

    async fn sign_personal_message(&self, data: &[u8]) -> Result<Signature, Self::Error> {
        let mut signature =
            self.client.sign_message(hash_message(data), &self.key_name).await?;
        signature.v += 27;
        Ok(signature)
    }

    fn native_key(&self) -> String {
        self.key_name.clone()
    }
}
