//! Signs with a key held on a Ledger device.

use super::{
    classify_transport_error, tokens, AddressValidation, AppConfiguration, LedgerError,
    LedgerTransport, TransportError, STATUS_INCORRECT_DATA,
};
use crate::Signer;
use async_trait::async_trait;
use celo_wallet_core::types::{RlpEncodedTx, Signature};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

// On-device confirmation happens at most once per signer; the enum keeps the
// transition explicit instead of a bare flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValidationState {
    Unvalidated,
    Validated,
}

/// Delegates signing to a Ledger device, addressing one derivation path.
///
/// Depending on the wallet's [`AddressValidation`] policy the signer forces
/// the device to display the address for visual confirmation before the
/// first (or every) use.
pub struct LedgerSigner<T> {
    ledger: Arc<T>,
    derivation_path: String,
    validation: AddressValidation,
    app_configuration: AppConfiguration,
    validation_state: Mutex<ValidationState>,
}

impl<T> LedgerSigner<T> {
    pub(crate) fn new(
        ledger: Arc<T>,
        derivation_path: String,
        validation: AddressValidation,
        app_configuration: AppConfiguration,
    ) -> Self {
        Self {
            ledger,
            derivation_path,
            validation,
            app_configuration,
            validation_state: Mutex::new(ValidationState::Unvalidated),
        }
    }

    fn validation_state(&self) -> MutexGuard<'_, ValidationState> {
        self.validation_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validation_required(&self) -> bool {
        match self.validation {
            AddressValidation::Never => false,
            AddressValidation::EveryTransaction => true,
            AddressValidation::FirstTransactionPerAddress => {
                *self.validation_state() == ValidationState::Unvalidated
            }
            // already confirmed during discovery
            AddressValidation::InitializationOnly => false,
        }
    }
}

impl<T: LedgerTransport> LedgerSigner<T> {
    async fn validated_derivation_path(&self) -> Result<&str, LedgerError> {
        if self.validation_required() {
            self.ledger
                .get_address(&self.derivation_path, true)
                .await
                .map_err(classify_transport_error)?;
            *self.validation_state() = ValidationState::Validated;
        }
        Ok(&self.derivation_path)
    }

    /// Sends ERC-20 metadata for recognized token contracts so the device
    /// renders a human-readable amount instead of raw hex.
    ///
    /// Strictly best-effort: unknown tokens, old app versions and delivery
    /// failures all skip silently.
    async fn check_for_known_token(&self, encoded_tx: &RlpEncodedTx) {
        if !tokens::accepts_contract_data(&self.app_configuration.version) {
            return
        }
        let chain_id =
            encoded_tx.transaction.chain_id.map(|id| id.as_u64()).unwrap_or_default();
        let candidates = [encoded_tx.transaction.to, encoded_tx.transaction.fee_currency];
        for address in candidates.into_iter().flatten() {
            if let Some(token) = tokens::token_info_by_address_and_chain_id(address, chain_id) {
                if let Err(err) = self.ledger.provide_erc20_token_information(token).await {
                    debug!(%err, ticker = token.ticker, "skipping token metadata preload");
                }
            }
        }
    }
}

#[async_trait]
impl<T: LedgerTransport> Signer for LedgerSigner<T> {
    type Error = LedgerError;

    async fn sign_transaction(
        &self,
        mut add_to_v: u64,
        encoded_tx: &RlpEncodedTx,
    ) -> Result<Signature, Self::Error> {
        let derivation_path = self.validated_derivation_path().await?.to_owned();
        self.check_for_known_token(encoded_tx).await;

        let signature = match self
            .ledger
            .sign_transaction(&derivation_path, encoded_tx.rlp.as_ref())
            .await
        {
            Ok(signature) => signature,
            // the device fails this way when it does not know the feeCurrency
            Err(TransportError::Status { code: STATUS_INCORRECT_DATA, .. }) => {
                debug!("possible invalid feeCurrency field");
                return Err(LedgerError::InvalidFeeCurrency)
            }
            Err(err) => return Err(classify_transport_error(err)),
        };

        // The device truncates the replay-protected v to a single byte, so
        // rebuild the full value from the chain-aware base: if the reported
        // byte is not a prefix-truncation of `add_to_v` itself, the recovery
        // bit was set.
        let rv = signature.v as u64;
        if rv != add_to_v && (rv & add_to_v) != rv {
            add_to_v += 1;
        }

        Ok(Signature::from_rsv(&signature.r, &signature.s, add_to_v))
    }

    async fn sign_personal_message(&self, data: &[u8]) -> Result<Signature, Self::Error> {
        let derivation_path = self.validated_derivation_path().await?.to_owned();
        let signature = self
            .ledger
            .sign_personal_message(&derivation_path, data)
            .await
            .map_err(classify_transport_error)?;
        Ok(Signature::from_rsv(&signature.r, &signature.s, signature.v as u64))
    }

    fn native_key(&self) -> String {
        self.derivation_path.clone()
    }
}
