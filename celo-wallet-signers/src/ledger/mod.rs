//! Ledger hardware wallet support.
//!
//! The physical device is reached through the [`LedgerTransport`] capability,
//! which mirrors the surface of the Celo Ledger app: address retrieval (with
//! optional on-device confirmation), transaction and personal-message
//! signing, app configuration and ERC-20 metadata delivery. Tests exercise
//! the wallet against an in-memory transport; production callers plug in an
//! APDU-backed implementation.

mod signer;
pub use signer::LedgerSigner;

pub mod tokens;
pub use tokens::TokenInfo;

use crate::{AccountLoader, RemoteWallet, RemoteWalletError};
use async_trait::async_trait;
use celo_wallet_core::types::Address;
use semver::Version;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Derivation path prefix of the celo chain (coin type 52752).
pub const CELO_BASE_DERIVATION_PATH: &str = "44'/52752'/0'/0";

/// How many consecutive address indexes discovery walks by default.
const ADDRESS_QTY: u32 = 5;

// Device status words this module gives a friendlier shape to. Everything
// else is rethrown verbatim.
const STATUS_APP_CLOSED: u16 = 0x6700;
const STATUS_DEVICE_LOCKED: u16 = 0x6804;
pub(crate) const STATUS_INCORRECT_DATA: u16 = 0x6a80;

/// When to force an on-device address confirmation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressValidation {
    /// Validate each address while the wallet is initialized, never again
    InitializationOnly,
    /// Validate the address every time a transaction is made
    EveryTransaction,
    /// Validate the address the first time that address signs anything
    #[default]
    FirstTransactionPerAddress,
    /// Never validate the addresses
    Never,
}

/// Configuration reported by the Celo app running on the device.
#[derive(Clone, Debug)]
pub struct AppConfiguration {
    /// Whether the app allows contract data in transactions
    pub arbitrary_data_enabled: bool,
    /// App version, used to gate optional features
    pub version: Version,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self { arbitrary_data_enabled: false, version: Version::new(0, 0, 0) }
    }
}

/// A raw signature as the device returns it: `v` is a single (possibly
/// truncated) byte.
#[derive(Clone, Copy, Debug)]
pub struct DeviceSignature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// Errors crossing the device boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device answered with a non-success status word
    #[error("ledger device returned status {code:#06x} ({status})")]
    Status { code: u16, status: String },
    /// The transport itself failed (USB gone, no device, ...)
    #[error("{0}")]
    Device(String),
}

/// The capability a Ledger transport must provide.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Returns the address for a derivation path, optionally displaying it
    /// on-device for visual confirmation.
    async fn get_address(
        &self,
        derivation_path: &str,
        display: bool,
    ) -> Result<Address, TransportError>;

    /// Signs an RLP transaction payload with the key at `derivation_path`.
    async fn sign_transaction(
        &self,
        derivation_path: &str,
        rlp_payload: &[u8],
    ) -> Result<DeviceSignature, TransportError>;

    /// Signs a personal message; the device applies the EIP-191 prefix.
    async fn sign_personal_message(
        &self,
        derivation_path: &str,
        data: &[u8],
    ) -> Result<DeviceSignature, TransportError>;

    /// Reads the app configuration.
    async fn get_app_configuration(&self) -> Result<AppConfiguration, TransportError>;

    /// Supplies ERC-20 metadata so the device can render token amounts.
    async fn provide_erc20_token_information(
        &self,
        token: &TokenInfo,
    ) -> Result<(), TransportError>;
}

// Transports are shared between the wallet and its signers, so delegating
// through `Arc` keeps callers free to hold their own handle.
#[async_trait]
impl<T: LedgerTransport + ?Sized> LedgerTransport for Arc<T> {
    async fn get_address(
        &self,
        derivation_path: &str,
        display: bool,
    ) -> Result<Address, TransportError> {
        (**self).get_address(derivation_path, display).await
    }

    async fn sign_transaction(
        &self,
        derivation_path: &str,
        rlp_payload: &[u8],
    ) -> Result<DeviceSignature, TransportError> {
        (**self).sign_transaction(derivation_path, rlp_payload).await
    }

    async fn sign_personal_message(
        &self,
        derivation_path: &str,
        data: &[u8],
    ) -> Result<DeviceSignature, TransportError> {
        (**self).sign_personal_message(derivation_path, data).await
    }

    async fn get_app_configuration(&self) -> Result<AppConfiguration, TransportError> {
        (**self).get_app_configuration().await
    }

    async fn provide_erc20_token_information(
        &self,
        token: &TokenInfo,
    ) -> Result<(), TransportError> {
        (**self).provide_erc20_token_information(token).await
    }
}

/// Errors produced by the Ledger wallet and signer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The device is unreachable: app closed, device locked or unplugged
    #[error("possible connection lost with the ledger, check if it is still on and connected")]
    ConnectionLost,
    /// The device rejected the transaction payload, typically because the
    /// fee currency is not one it knows
    #[error("incorrect data, verify that the feeCurrency is a valid one")]
    InvalidFeeCurrency,
    /// Any other transport failure, rethrown verbatim
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Maps the well-known "check your device" status words onto a
/// user-actionable error; everything else passes through untouched.
pub(crate) fn classify_transport_error(err: TransportError) -> LedgerError {
    match &err {
        TransportError::Status { code, .. }
            if matches!(*code, STATUS_APP_CLOSED | STATUS_DEVICE_LOCKED) =>
        {
            LedgerError::ConnectionLost
        }
        TransportError::Device(message) if message == "NoDevice" => LedgerError::ConnectionLost,
        _ => LedgerError::Transport(err),
    }
}

/// Discovers one signer per derivation-path index.
pub struct LedgerAccountLoader<T> {
    ledger: Arc<T>,
    derivation_path_indexes: Vec<u32>,
    base_derivation_path: String,
    validation: AddressValidation,
}

impl<T: LedgerTransport> LedgerAccountLoader<T> {
    async fn retrieve_app_configuration(&self) -> Result<AppConfiguration, LedgerError> {
        let config =
            self.ledger.get_app_configuration().await.map_err(classify_transport_error)?;
        if !config.arbitrary_data_enabled {
            warn!(
                "the ledger does not allow the use of contract data; some features may not work \
                 correctly, including token transfers. Enable it from the app settings."
            );
        }
        Ok(config)
    }
}

#[async_trait]
impl<T: LedgerTransport + 'static> AccountLoader for LedgerAccountLoader<T> {
    type Signer = LedgerSigner<T>;

    async fn load_account_signers(
        &self,
    ) -> Result<Vec<(Address, LedgerSigner<T>)>, LedgerError> {
        debug!("fetching addresses from the ledger");
        let app_configuration = self.retrieve_app_configuration().await?;
        let validation_required = self.validation == AddressValidation::InitializationOnly;

        let mut signers = Vec::with_capacity(self.derivation_path_indexes.len());
        for index in &self.derivation_path_indexes {
            let derivation_path = format!("{}/{}", self.base_derivation_path, index);
            let address = self
                .ledger
                .get_address(&derivation_path, validation_required)
                .await
                .map_err(classify_transport_error)?;
            signers.push((
                address,
                LedgerSigner::new(
                    Arc::clone(&self.ledger),
                    derivation_path,
                    self.validation,
                    app_configuration.clone(),
                ),
            ));
        }
        Ok(signers)
    }
}

/// A remote wallet over Ledger-held keys.
pub type LedgerWallet<T> = RemoteWallet<LedgerAccountLoader<T>>;

impl<T: LedgerTransport + 'static> LedgerWallet<T> {
    /// Creates an uninitialized wallet over the first five indexes of the
    /// celo base derivation path, with the default validation policy.
    pub fn from_transport(transport: T) -> Self {
        Self::with_options(
            transport,
            (0..ADDRESS_QTY).collect(),
            CELO_BASE_DERIVATION_PATH,
            AddressValidation::default(),
        )
    }

    /// Creates an uninitialized wallet addressing
    /// `{base_derivation_path}/{index}` for each given index.
    pub fn with_options(
        transport: T,
        derivation_path_indexes: Vec<u32>,
        base_derivation_path: impl Into<String>,
        validation: AddressValidation,
    ) -> Self {
        RemoteWallet::new(LedgerAccountLoader {
            ledger: Arc::new(transport),
            derivation_path_indexes,
            base_derivation_path: base_derivation_path.into(),
            validation,
        })
    }

    /// Creates a wallet and runs account discovery before returning it.
    pub async fn new_with_setup(
        transport: T,
    ) -> Result<Self, RemoteWalletError<LedgerAccountLoader<T>>> {
        let wallet = Self::from_transport(transport);
        wallet.init().await?;
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let lost = classify_transport_error(TransportError::Status {
            code: STATUS_APP_CLOSED,
            status: "INCORRECT_LENGTH".into(),
        });
        assert!(matches!(lost, LedgerError::ConnectionLost));

        let locked = classify_transport_error(TransportError::Status {
            code: STATUS_DEVICE_LOCKED,
            status: "DEVICE_LOCKED".into(),
        });
        assert!(matches!(locked, LedgerError::ConnectionLost));

        let gone = classify_transport_error(TransportError::Device("NoDevice".into()));
        assert!(matches!(gone, LedgerError::ConnectionLost));

        // unrecognized status words are rethrown verbatim
        let other = classify_transport_error(TransportError::Status {
            code: 0x6985,
            status: "CONDITIONS_OF_USE_NOT_SATISFIED".into(),
        });
        assert!(matches!(
            other,
            LedgerError::Transport(TransportError::Status { code: 0x6985, .. })
        ));
    }
}
