pub mod eip712;
pub mod request;

use crate::types::{Address, Signature, U64};

// Number of base fields in a celo-legacy transaction: nonce, gasPrice, gas,
// feeCurrency, gatewayFeeRecipient, gatewayFee, to, value, data.
pub(crate) const BASE_NUM_TX_FIELDS: usize = 9;

// Number of fields in the replay-protected signing payload (and in the final
// signed encoding, where [chainId, 0, 0] is replaced by [v, r, s]).
pub(crate) const NUM_TX_FIELDS: usize = BASE_NUM_TX_FIELDS + 3;

/// Appends `opt` to the stream, falling back to the canonical empty-string
/// sentinel. RLP needs a concrete byte representation for every slot, so
/// absent fields are never skipped.
pub(crate) fn rlp_opt<T: rlp::Encodable>(rlp: &mut rlp::RlpStream, opt: &Option<T>) {
    if let Some(inner) = opt {
        rlp.append(inner);
    } else {
        rlp.append(&"");
    }
}

/// Normalizes a transaction `v` back to the raw 0/1 recovery id.
pub fn normalize_v(v: u64, chain_id: U64) -> u64 {
    if v > 1 {
        v - chain_id.as_u64() * 2 - 35
    } else {
        v
    }
}

/// Extracts the chain id folded into a signature `v` value.
///
/// Replay-protected signatures carry `v = {0, 1} + chain_id * 2 + 35`;
/// anything below 35 is the legacy 'Electrum' notation with no chain binding.
pub fn extract_chain_id(v: u64) -> Option<U64> {
    if v >= 35 {
        return Some(U64::from((v - 35) >> 1))
    }
    None
}

/// Decodes a raw signed transaction and recovers the address that produced
/// its signature.
pub fn recover_transaction(
    raw: &[u8],
) -> Result<(request::CeloTransactionRequest, Address), request::RequestError> {
    let rlp = rlp::Rlp::new(raw);
    let (tx, _) = request::CeloTransactionRequest::decode_signed_rlp(&rlp)?;
    let from = tx.from.ok_or(request::RequestError::RecoveryError(
        crate::types::SignatureError::RecoveryError,
    ))?;
    Ok((tx, from))
}

/// Decodes the signature portion of an RLP list starting at `offset`,
/// incrementing the offset for each element parsed.
#[inline]
pub(crate) fn decode_signature(
    rlp: &rlp::Rlp,
    offset: &mut usize,
) -> Result<Signature, rlp::DecoderError> {
    let sig = Signature {
        v: rlp.val_at(*offset)?,
        r: rlp.val_at(*offset + 1)?,
        s: rlp.val_at(*offset + 2)?,
    };
    *offset += 3;
    Ok(sig)
}

/// Decodes an optional address slot. The empty-string sentinel maps back to
/// `None`; this covers `to` for contract creations as well as the optional
/// celo fee fields.
#[inline]
pub(crate) fn decode_opt_address(
    rlp: &rlp::Rlp,
    offset: &mut usize,
) -> Result<Option<Address>, rlp::DecoderError> {
    let slot = rlp.at(*offset)?;
    let address = if slot.is_empty() {
        if slot.is_data() {
            None
        } else {
            return Err(rlp::DecoderError::RlpExpectedToBeData)
        }
    } else {
        Some(slot.as_val()?)
    };
    *offset += 1;

    Ok(address)
}
