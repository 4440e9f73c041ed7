//! The Azure Key Vault client layer.
//!
//! [`KeyVaultService`] is the raw remote surface (list keys, fetch key
//! material, sign a digest); [`AzureKeyVaultClient`] layers the signing
//! corrections on top: public key assembly and validation, low-`S`
//! canonicalization and recovery-id reconstruction, none of which the vault
//! performs itself.

use async_trait::async_trait;
use celo_wallet_core::{
    k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey},
    types::{Signature, H256, U256},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use tracing::debug;

/// Errors from the vault or from interpreting what it returned.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The named key does not exist in this vault
    #[error("key {key} not found in KeyVault {vault}")]
    KeyNotFound { key: String, vault: String },
    /// The key material is not a usable secp256k1 public key
    #[error("invalid secp256k1 public key for keyname {0}")]
    InvalidPublicKey(String),
    /// The vault returned something other than a 64-byte r ‖ s signature
    #[error("invalid signature returned from the vault, expected 64 bytes, got {0}")]
    InvalidSignature(usize),
    /// No recovery id in 0..4 reproduces the vault's public key
    #[error("unable to generate recovery id from signature")]
    RecoveryFailed,
    /// Network/auth/service failures, surfaced verbatim
    #[error("unexpected KeyVault error: {0}")]
    Service(String),
}

/// Key material as the vault reports it: the key identifier plus the
/// big-endian affine coordinates of the public point (JWK `x`/`y`).
#[derive(Clone, Debug)]
pub struct VaultKey {
    pub id: String,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

/// The raw remote surface of a key vault.
///
/// `sign_digest` must return the plain 64-byte `r ‖ s` concatenation; the
/// vault has no notion of recovery ids or chain binding.
#[async_trait]
pub trait KeyVaultService: Send + Sync {
    async fn list_key_names(&self) -> Result<Vec<String>, VaultError>;

    async fn get_key(&self, key_name: &str) -> Result<VaultKey, VaultError>;

    async fn sign_digest(&self, key_name: &str, digest: &[u8; 32])
        -> Result<Vec<u8>, VaultError>;
}

/// Provides an abstraction over a key vault for performing signing
/// operations, shared read-only by every signer addressing that vault.
pub struct AzureKeyVaultClient<K> {
    vault_name: String,
    service: K,
}

impl<K: KeyVaultService> AzureKeyVaultClient<K> {
    pub fn new(service: K, vault_name: impl Into<String>) -> Self {
        Self { vault_name: vault_name.into(), service }
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    /// Lists the names of the keys held by the vault.
    pub async fn get_keys(&self) -> Result<Vec<String>, VaultError> {
        self.service.list_key_names().await
    }

    /// Whether the vault holds a key under `key_name`.
    pub async fn has_key(&self, key_name: &str) -> Result<bool, VaultError> {
        match self.service.get_key(key_name).await {
            Ok(_) => Ok(true),
            Err(VaultError::KeyNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Fetches and validates the secp256k1 public key stored under
    /// `key_name`.
    pub async fn get_public_key(&self, key_name: &str) -> Result<VerifyingKey, VaultError> {
        let key = self.service.get_key(key_name).await?;

        // 0x04 prefix indicates that the key is not compressed
        // https://tools.ietf.org/html/rfc5480#section-2.2
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        extend_padded_scalar(&mut sec1, &key.x);
        extend_padded_scalar(&mut sec1, &key.y);

        VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|_| VaultError::InvalidPublicKey(key_name.to_string()))
    }

    /// Signs a 32-byte digest with the named key, returning a signature with
    /// a plain `v ∈ {0, 1}` recovery id.
    ///
    /// The vault may hand back a high-`S` signature, which Ethereum rejects;
    /// it is transposed to the lower intersection before the recovery id is
    /// reconstructed by trial against the vault's public key.
    pub async fn sign_message(
        &self,
        digest: H256,
        key_name: &str,
    ) -> Result<Signature, VaultError> {
        let public_key = self.get_public_key(key_name).await?;

        let raw = self.service.sign_digest(key_name, &digest.0).await?;
        if raw.len() != 64 {
            return Err(VaultError::InvalidSignature(raw.len()))
        }
        let signature = EcdsaSignature::from_slice(&raw)
            .map_err(|_| VaultError::InvalidSignature(raw.len()))?;

        let signature = match signature.normalize_s() {
            Some(normalized) => {
                debug!("canonicalizing signature");
                normalized
            }
            None => signature,
        };

        let v = recovery_id_by_trial(&signature, &public_key, &digest)?;
        let r = U256::from_big_endian(signature.r().to_bytes().as_slice());
        let s = U256::from_big_endian(signature.s().to_bytes().as_slice());
        Ok(Signature { r, s, v: v as u64 })
    }
}

// JWK coordinates may omit leading zero bytes; the SEC1 form must not.
fn extend_padded_scalar(out: &mut Vec<u8>, scalar: &[u8]) {
    let scalar = {
        let first_nonzero = scalar.iter().position(|b| *b != 0).unwrap_or(scalar.len());
        &scalar[first_nonzero..]
    };
    out.extend(std::iter::repeat(0u8).take(32usize.saturating_sub(scalar.len())));
    out.extend_from_slice(scalar);
}

/// Attempts each recovery id until one reproduces the expected public key.
fn recovery_id_by_trial(
    signature: &EcdsaSignature,
    public_key: &VerifyingKey,
    digest: &H256,
) -> Result<u8, VaultError> {
    for candidate in 0u8..4 {
        let Some(recovery_id) = RecoveryId::from_byte(candidate) else { continue };
        if let Ok(recovered) =
            VerifyingKey::recover_from_prehash(digest.as_bytes(), signature, recovery_id)
        {
            if recovered == *public_key {
                return Ok(candidate)
            }
        }
    }
    Err(VaultError::RecoveryFailed)
}

/// Builds and memoizes one [`AzureKeyVaultClient`] per vault name, so every
/// signer addressing the same vault reuses a single connection handle.
///
/// The connector is injected at construction, which keeps tests free to
/// substitute an in-memory vault.
pub struct KeyVaultClientFactory<K, F> {
    connect: F,
    clients: Mutex<HashMap<String, Arc<AzureKeyVaultClient<K>>>>,
}

impl<K, F> KeyVaultClientFactory<K, F>
where
    K: KeyVaultService,
    F: Fn(&str) -> K,
{
    pub fn new(connect: F) -> Self {
        Self { connect, clients: Mutex::new(HashMap::new()) }
    }

    /// The shared client for `vault_name`, created on first use.
    pub fn client_for(&self, vault_name: &str) -> Arc<AzureKeyVaultClient<K>> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(vault_name.to_string())
            .or_insert_with(|| {
                Arc::new(AzureKeyVaultClient::new((self.connect)(vault_name), vault_name))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_padding() {
        let mut out = Vec::new();
        extend_padded_scalar(&mut out, &[0xab; 30]);
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..2], &[0, 0]);

        let mut out = Vec::new();
        extend_padded_scalar(&mut out, &[0x11; 32]);
        assert_eq!(out.len(), 32);

        // oversized-but-zero-led input is trimmed back down
        let mut padded_input = vec![0u8; 2];
        padded_input.extend([0x22; 32]);
        let mut out = Vec::new();
        extend_padded_scalar(&mut out, &padded_input);
        assert_eq!(out.len(), 32);
        assert_eq!(out, vec![0x22; 32]);
    }
}
