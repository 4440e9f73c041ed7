//! The in-memory private-key signer.

use crate::{Signer, WalletBase};
use async_trait::async_trait;
use celo_wallet_core::{
    k256::ecdsa::{self, SigningKey},
    rand::{CryptoRng, RngCore},
    types::{Address, RlpEncodedTx, Signature, U256},
    utils::{hash_message, secret_key_to_address},
};
use std::fmt;
use thiserror::Error;

/// Error thrown when building a [`LocalSigner`] from key material.
#[derive(Debug, Error)]
pub enum LocalSignerError {
    /// The key hex decoded to something other than 32 bytes
    #[error("expected 32 bytes of private key")]
    InvalidKeyLength,
    /// The key was not valid hex
    #[error(transparent)]
    HexError(#[from] hex::FromHexError),
    /// The bytes are not a valid secp256k1 scalar
    #[error(transparent)]
    EcdsaError(#[from] ecdsa::Error),
}

/// Signs with a raw secp256k1 private key held in memory.
///
/// Signing is pure math, so there are no runtime failure modes beyond a
/// malformed key at construction.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Builds a signer from a 0x-optional hex private key.
    pub fn new(private_key: &str) -> Result<Self, LocalSignerError> {
        let stripped = private_key.strip_prefix("0x").unwrap_or(private_key);
        let bytes = hex::decode(stripped)?;
        if bytes.len() != 32 {
            return Err(LocalSignerError::InvalidKeyLength)
        }
        Ok(Self::from_key(SigningKey::from_slice(&bytes)?))
    }

    /// Builds a signer from an existing signing key.
    pub fn from_key(key: SigningKey) -> Self {
        let address = secret_key_to_address(&key);
        Self { key, address }
    }

    /// Creates a signer with a fresh random keypair seeded from `rng`.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_key(SigningKey::random(rng))
    }

    /// The address derived from the held private key.
    pub fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: &[u8], v_base: u64) -> Result<Signature, LocalSignerError> {
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(digest)?;
        let r = U256::from_big_endian(signature.r().to_bytes().as_slice());
        let s = U256::from_big_endian(signature.s().to_bytes().as_slice());
        Ok(Signature { r, s, v: v_base + recovery_id.to_byte() as u64 })
    }
}

// do not log the key material
impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner").field("address", &self.address).finish()
    }
}

#[async_trait]
impl Signer for LocalSigner {
    type Error = LocalSignerError;

    async fn sign_transaction(
        &self,
        add_to_v: u64,
        encoded_tx: &RlpEncodedTx,
    ) -> Result<Signature, Self::Error> {
        self.sign_digest(encoded_tx.sighash().as_bytes(), add_to_v)
    }

    async fn sign_personal_message(&self, data: &[u8]) -> Result<Signature, Self::Error> {
        self.sign_digest(hash_message(data).as_bytes(), 27)
    }

    fn native_key(&self) -> String {
        format!("0x{}", hex::encode(self.key.to_bytes()))
    }
}

/// A wallet over in-memory private keys.
pub type LocalWallet = WalletBase<LocalSigner>;

impl LocalWallet {
    /// Registers the account controlled by `private_key` and returns its
    /// address. Re-adding a key that derives an already registered address
    /// is a no-op.
    pub fn add_account(&self, private_key: &str) -> Result<Address, LocalSignerError> {
        let signer = LocalSigner::new(private_key)?;
        let address = signer.address();
        self.add_signer(address, signer);
        Ok(address)
    }

    /// Generates a fresh keypair from `rng` and registers it.
    pub fn add_random_account<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Address {
        let signer = LocalSigner::random(rng);
        let address = signer.address();
        self.add_signer(address, signer);
        address
    }
}
