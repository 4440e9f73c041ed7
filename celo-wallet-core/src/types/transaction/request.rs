//! Celo-legacy transaction requests and their signing-oriented RLP forms.
use super::{
    decode_opt_address, decode_signature, extract_chain_id, rlp_opt, BASE_NUM_TX_FIELDS,
    NUM_TX_FIELDS,
};
use crate::{
    types::{Address, Bytes, Signature, SignatureError, H256, U256, U64},
    utils::keccak256,
};

use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error involving a transaction request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// When decoding a transaction request from RLP
    #[error(transparent)]
    DecodingError(#[from] rlp::DecoderError),
    /// When recovering the address from a signature
    #[error(transparent)]
    RecoveryError(#[from] SignatureError),
}

/// Parameters for sending a celo transaction.
///
/// On top of the standard Ethereum fields this carries the Celo-specific
/// `feeCurrency`, `gatewayFeeRecipient` and `gatewayFee` triple. Every
/// optional field RLP-encodes as the canonical empty sentinel when absent,
/// so two requests with the same populated fields always produce the same
/// payload bit-for-bit.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct CeloTransactionRequest {
    /// Sender address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    /// Recipient address (None for contract creation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,

    /// Supplied gas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,

    /// Gas price, denominated in the fee currency
    #[serde(rename = "gasPrice")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,

    /// Transferred value (None for no transfer)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,

    /// The compiled code of a contract OR the first 4 bytes of the hash of the
    /// invoked method signature and encoded parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,

    /// Transaction nonce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,

    /// Chain ID; `None` (or zero) signs without replay protection
    #[serde(skip_serializing)]
    #[serde(default, rename = "chainId")]
    pub chain_id: Option<U64>,

    /// The currency fees are paid in (None for the native currency)
    #[serde(rename = "feeCurrency")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_currency: Option<Address>,

    /// Full-node that is allowed to collect the gateway fee (None for no
    /// gateway fee paid)
    #[serde(rename = "gatewayFeeRecipient")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_fee_recipient: Option<Address>,

    /// Gateway fee amount (None for no gateway fee paid)
    #[serde(rename = "gatewayFee")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_fee: Option<U256>,
}

/// A transaction together with the exact byte payload that will be hashed and
/// signed. Hardware and remote signers re-derive what they display to the
/// user from `rlp`, so the pair is built once per signing operation and
/// handed around as a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RlpEncodedTx {
    /// The request the payload was derived from
    pub transaction: CeloTransactionRequest,
    /// RLP signing payload, including the `[chainId, 0, 0]` trailer when the
    /// transaction is replay protected
    pub rlp: Bytes,
}

impl RlpEncodedTx {
    /// The digest a signer actually signs.
    pub fn sighash(&self) -> H256 {
        H256(keccak256(self.rlp.as_ref()))
    }

    /// Merges a signature into the final serialized transaction.
    pub fn encode_with_signature(&self, signature: Signature) -> EncodedTransaction {
        let raw = self.transaction.rlp_signed(&signature);
        let hash = H256(keccak256(raw.as_ref()));
        EncodedTransaction { tx: self.transaction.clone(), signature, raw, hash }
    }
}

/// A fully signed transaction: the structured view of its fields alongside
/// the raw bytes ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedTransaction {
    /// Structured view of the signed fields
    pub tx: CeloTransactionRequest,
    /// The merged signature
    pub signature: Signature,
    /// The serialized raw transaction
    pub raw: Bytes,
    /// Keccak-256 of `raw`, i.e. the transaction hash
    pub hash: H256,
}

impl CeloTransactionRequest {
    /// Creates an empty transaction request with all fields left empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience function for sending a new payment transaction to the
    /// receiver.
    pub fn pay<T: Into<Address>, V: Into<U256>>(to: T, value: V) -> Self {
        CeloTransactionRequest {
            to: Some(to.into()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    // Builder pattern helpers

    /// Sets the `from` field in the transaction to the provided value
    #[must_use]
    pub fn from<T: Into<Address>>(mut self, from: T) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Sets the `to` field in the transaction to the provided value
    #[must_use]
    pub fn to<T: Into<Address>>(mut self, to: T) -> Self {
        self.to = Some(to.into());
        self
    }

    /// Sets the `gas` field in the transaction to the provided value
    #[must_use]
    pub fn gas<T: Into<U256>>(mut self, gas: T) -> Self {
        self.gas = Some(gas.into());
        self
    }

    /// Sets the `gas_price` field in the transaction to the provided value
    #[must_use]
    pub fn gas_price<T: Into<U256>>(mut self, gas_price: T) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    /// Sets the `value` field in the transaction to the provided value
    #[must_use]
    pub fn value<T: Into<U256>>(mut self, value: T) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the `data` field in the transaction to the provided value
    #[must_use]
    pub fn data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Sets the `nonce` field in the transaction to the provided value
    #[must_use]
    pub fn nonce<T: Into<U256>>(mut self, nonce: T) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Sets the `chain_id` field in the transaction to the provided value
    #[must_use]
    pub fn chain_id<T: Into<U64>>(mut self, chain_id: T) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }

    /// Sets the `fee_currency` field in the transaction to the provided value
    #[must_use]
    pub fn fee_currency<T: Into<Address>>(mut self, fee_currency: T) -> Self {
        self.fee_currency = Some(fee_currency.into());
        self
    }

    /// Sets the `gateway_fee` field in the transaction to the provided value
    #[must_use]
    pub fn gateway_fee<T: Into<U256>>(mut self, gateway_fee: T) -> Self {
        self.gateway_fee = Some(gateway_fee.into());
        self
    }

    /// Sets the `gateway_fee_recipient` field in the transaction to the
    /// provided value
    #[must_use]
    pub fn gateway_fee_recipient<T: Into<Address>>(mut self, gateway_fee_recipient: T) -> Self {
        self.gateway_fee_recipient = Some(gateway_fee_recipient.into());
        self
    }

    /// The chain id the signature must be bound to, if any. Chain id zero
    /// means "no replay protection" and signs like the pre-EIP-155 format.
    pub fn replay_chain_id(&self) -> Option<U64> {
        self.chain_id.filter(|id| !id.is_zero())
    }

    /// Hashes the transaction's signing payload to obtain the signing digest.
    pub fn sighash(&self) -> H256 {
        H256(keccak256(self.rlp().as_ref()))
    }

    /// Gets the transaction's RLP encoding, prepared with the `[chainId, 0,
    /// 0]` trailer for replay-protected signing. Falls back to the bare
    /// 9-field payload when no (or a zero) chain id is set.
    pub fn rlp(&self) -> Bytes {
        let mut rlp = RlpStream::new();
        if let Some(chain_id) = self.replay_chain_id() {
            rlp.begin_list(NUM_TX_FIELDS);
            self.rlp_base(&mut rlp);
            rlp.append(&chain_id);
            rlp.append(&0u8);
            rlp.append(&0u8);
        } else {
            rlp.begin_list(BASE_NUM_TX_FIELDS);
            self.rlp_base(&mut rlp);
        }
        rlp.out().freeze().into()
    }

    /// Gets the unsigned transaction's RLP encoding
    pub fn rlp_unsigned(&self) -> Bytes {
        let mut rlp = RlpStream::new();
        rlp.begin_list(BASE_NUM_TX_FIELDS);
        self.rlp_base(&mut rlp);
        rlp.out().freeze().into()
    }

    /// Produces the RLP encoding of the transaction with the provided
    /// signature, i.e. the raw transaction ready for submission.
    pub fn rlp_signed(&self, signature: &Signature) -> Bytes {
        let mut rlp = RlpStream::new();
        rlp.begin_list(NUM_TX_FIELDS);

        self.rlp_base(&mut rlp);

        // append the signature; `r`/`s` are `U256`, so the canonical minimal
        // big-endian form is emitted even if a signer produced leading zeros
        rlp.append(&signature.v);
        rlp.append(&signature.r);
        rlp.append(&signature.s);
        rlp.out().freeze().into()
    }

    /// Builds the payload/transaction pair handed to signers.
    pub fn encode_for_signing(&self) -> RlpEncodedTx {
        RlpEncodedTx { transaction: self.clone(), rlp: self.rlp() }
    }

    // This order matches the celo-blockchain fork of geth.
    fn rlp_base(&self, rlp: &mut RlpStream) {
        rlp_opt(rlp, &self.nonce);
        rlp_opt(rlp, &self.gas_price);
        rlp_opt(rlp, &self.gas);

        rlp_opt(rlp, &self.fee_currency);
        rlp_opt(rlp, &self.gateway_fee_recipient);
        rlp_opt(rlp, &self.gateway_fee);

        rlp_opt(rlp, &self.to);
        rlp_opt(rlp, &self.value);
        rlp_opt(rlp, &self.data.as_ref().map(|d| d.as_ref()));
    }

    /// Decodes the base fields, returning the transaction request and
    /// incrementing the counter passed as we are traversing the rlp list.
    pub(crate) fn decode_unsigned_rlp_base(
        rlp: &rlp::Rlp,
        offset: &mut usize,
    ) -> Result<Self, rlp::DecoderError> {
        let mut txn = CeloTransactionRequest::new();
        txn.nonce = Some(rlp.at(*offset)?.as_val()?);
        *offset += 1;
        txn.gas_price = Some(rlp.at(*offset)?.as_val()?);
        *offset += 1;
        txn.gas = Some(rlp.at(*offset)?.as_val()?);
        *offset += 1;

        txn.fee_currency = decode_opt_address(rlp, offset)?;
        txn.gateway_fee_recipient = decode_opt_address(rlp, offset)?;
        txn.gateway_fee = Some(rlp.at(*offset)?.as_val()?);
        *offset += 1;

        txn.to = decode_opt_address(rlp, offset)?;
        txn.value = Some(rlp.at(*offset)?.as_val()?);
        *offset += 1;

        let data = rlp.at(*offset)?.data()?;
        txn.data = match data.len() {
            0 => None,
            _ => Some(Bytes::from(data.to_vec())),
        };
        *offset += 1;
        Ok(txn)
    }

    /// Decodes an (unsigned) signing payload into a transaction request.
    pub fn decode_unsigned_rlp(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        let mut offset = 0;
        let mut txn = Self::decode_unsigned_rlp_base(rlp, &mut offset)?;

        // a replay-protected payload carries its chain id in the trailer
        if let Ok(chain_id) = rlp.val_at(offset) {
            txn.chain_id = Some(chain_id);
        }

        Ok(txn)
    }

    /// Decodes the given RLP into a signed transaction, recovering the
    /// sender address into the `from` field along the way.
    pub fn decode_signed_rlp(rlp: &rlp::Rlp) -> Result<(Self, Signature), RequestError> {
        let mut offset = 0;
        let mut txn = Self::decode_unsigned_rlp_base(rlp, &mut offset)?;

        let sig = decode_signature(rlp, &mut offset)?;
        // the chain id is folded into `v` once signed
        txn.chain_id = extract_chain_id(sig.v);
        txn.from = Some(sig.recover(txn.sighash())?);

        Ok((txn, sig))
    }
}

impl rlp::Decodable for CeloTransactionRequest {
    /// Decodes the given RLP into a transaction request, ignoring the
    /// signature if populated
    fn decode(rlp: &rlp::Rlp) -> Result<Self, rlp::DecoderError> {
        Self::decode_unsigned_rlp(rlp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::secret_key_to_address;
    use k256::ecdsa::SigningKey;
    use rlp::Rlp;

    fn test_key() -> (SigningKey, Address) {
        let key = SigningKey::from_slice(
            &hex::decode("1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef")
                .unwrap(),
        )
        .unwrap();
        let address = secret_key_to_address(&key);
        (key, address)
    }

    fn sign(tx: &CeloTransactionRequest, key: &SigningKey) -> Signature {
        let sighash = tx.sighash();
        let (sig, rec_id) = key.sign_prehash_recoverable(sighash.as_bytes()).unwrap();
        let v = match tx.replay_chain_id() {
            Some(id) => id.as_u64() * 2 + 35 + rec_id.to_byte() as u64,
            None => 27 + rec_id.to_byte() as u64,
        };
        let r = U256::from_big_endian(&sig.r().to_bytes());
        let s = U256::from_big_endian(&sig.s().to_bytes());
        Signature { r, s, v }
    }

    #[test]
    fn empty_request_encodes_sentinels() {
        let tx = CeloTransactionRequest::new();
        // nine empty slots
        let mut expected: Vec<u8> = vec![0xc0 + 9];
        expected.extend(std::iter::repeat(0x80u8).take(9));
        assert_eq!(tx.rlp_unsigned().to_vec(), expected);
    }

    #[test]
    fn replay_protected_payload_has_trailer() {
        let tx = CeloTransactionRequest::new().nonce(3).gas(21000).gas_price(1).chain_id(1u64);
        let unsigned = tx.rlp_unsigned();
        let protected = tx.rlp();
        // [chainId, 0, 0]
        assert_eq!(protected.len(), unsigned.len() + 3);

        let decoded = Rlp::new(protected.as_ref());
        assert_eq!(decoded.item_count().unwrap(), 12);
        assert_eq!(Rlp::new(unsigned.as_ref()).item_count().unwrap(), 9);
    }

    #[test]
    fn chain_id_zero_signs_without_replay_protection() {
        let with_zero = CeloTransactionRequest::new().nonce(1).chain_id(0u64);
        let without = CeloTransactionRequest::new().nonce(1);
        assert_eq!(with_zero.rlp(), without.rlp());
        assert_eq!(with_zero.sighash(), without.sighash());
    }

    #[test]
    fn encode_decode_rlp() {
        let tx = CeloTransactionRequest::new()
            .nonce(3)
            .gas_price(1)
            .gas(25000)
            .to("b94f5374fce5edbc8e2a8697c15331677e6ebf0b".parse::<Address>().unwrap())
            .value(10)
            .data(vec![0x55, 0x44])
            .chain_id(1u64);

        let rlp_bytes = tx.rlp();
        let decoded =
            CeloTransactionRequest::decode_unsigned_rlp(&Rlp::new(rlp_bytes.as_ref())).unwrap();

        // We compare the sighash rather than the specific struct, since
        // absent numeric fields decode as their zero sentinels.
        assert_eq!(tx.sighash(), decoded.sighash());
    }

    #[test]
    fn celo_fields_round_trip_exactly() {
        let fee_currency: Address =
            "765de816845861e75a25fca122bb6898b8b1282a".parse().unwrap();
        let recipient: Address = "b94f5374fce5edbc8e2a8697c15331677e6ebf0b".parse().unwrap();
        let to: Address = "2e485e0c23b4c3c542628a5f672eeab0ad4888be".parse().unwrap();

        let (key, from) = test_key();
        let tx = CeloTransactionRequest::new()
            .nonce(0)
            .gas(10)
            .gas_price(99)
            .to(to)
            .value(U256::exp10(18))
            .data(vec![0xab, 0xcd, 0xef])
            .fee_currency(fee_currency)
            .gateway_fee_recipient(recipient)
            .gateway_fee(0x5678)
            .chain_id(44378u64);

        let signed = tx.encode_for_signing().encode_with_signature(sign(&tx, &key));
        let (decoded, sig) =
            CeloTransactionRequest::decode_signed_rlp(&Rlp::new(signed.raw.as_ref())).unwrap();

        assert_eq!(decoded.nonce, Some(U256::zero()));
        assert_eq!(decoded.gas, Some(U256::from(10)));
        assert_eq!(decoded.gas_price, Some(U256::from(99)));
        assert_eq!(decoded.to, Some(to));
        assert_eq!(decoded.value, Some(U256::exp10(18)));
        assert_eq!(decoded.data, Some(Bytes::from(vec![0xab, 0xcd, 0xef])));
        assert_eq!(decoded.fee_currency, Some(fee_currency));
        assert_eq!(decoded.gateway_fee_recipient, Some(recipient));
        assert_eq!(decoded.gateway_fee, Some(U256::from(0x5678)));
        assert_eq!(decoded.chain_id, Some(U64::from(44378u64)));
        assert_eq!(decoded.from, Some(from));
        let base = 44378 * 2 + 35;
        assert!(sig.v == base || sig.v == base + 1);
    }

    #[test]
    fn optional_field_power_set_recovers_signer() {
        let (key, from) = test_key();
        let fee_currency: Address =
            "765de816845861e75a25fca122bb6898b8b1282a".parse().unwrap();
        let recipient: Address = "b94f5374fce5edbc8e2a8697c15331677e6ebf0b".parse().unwrap();

        for mask in 0u8..16 {
            let mut tx = CeloTransactionRequest::new()
                .nonce(7)
                .gas(50000)
                .gas_price(2)
                .to("2e485e0c23b4c3c542628a5f672eeab0ad4888be".parse::<Address>().unwrap())
                .value(1234)
                .chain_id(44378u64);
            if mask & 1 != 0 {
                tx = tx.fee_currency(fee_currency);
            }
            if mask & 2 != 0 {
                tx = tx.gateway_fee_recipient(recipient);
            }
            if mask & 4 != 0 {
                tx = tx.gateway_fee(0x9999);
            }
            if mask & 8 != 0 {
                tx = tx.data(vec![0xde, 0xad, 0xbe, 0xef]);
            }

            let raw = tx.rlp_signed(&sign(&tx, &key));
            let (decoded, _) =
                CeloTransactionRequest::decode_signed_rlp(&Rlp::new(raw.as_ref())).unwrap();
            assert_eq!(decoded.from, Some(from), "field mask {mask:#06b}");
        }
    }

    #[test]
    fn leading_zero_s_is_canonicalized_and_recovers() {
        let (key, from) = test_key();

        let mut exercised = false;
        for nonce in 0u64..2000 {
            let tx = CeloTransactionRequest::new()
                .nonce(nonce)
                .gas(21000)
                .gas_price(5)
                .to("2e485e0c23b4c3c542628a5f672eeab0ad4888be".parse::<Address>().unwrap())
                .value(1)
                .chain_id(2u64);
            let sig = sign(&tx, &key);

            // only interested in signatures whose 32-byte form starts 0x00
            if sig.s > U256::from_big_endian(&[0xff; 31]) &&
                sig.r > U256::from_big_endian(&[0xff; 31])
            {
                continue
            }
            exercised = true;

            let raw = tx.rlp_signed(&sig);
            // the canonical serialized scalar never re-introduces the zero byte
            let rlp = Rlp::new(raw.as_ref());
            let r_bytes = rlp.at(10).unwrap().data().unwrap();
            let s_bytes = rlp.at(11).unwrap().data().unwrap();
            assert!(r_bytes.first() != Some(&0), "r must be minimal");
            assert!(s_bytes.first() != Some(&0), "s must be minimal");

            let (decoded, _) = CeloTransactionRequest::decode_signed_rlp(&rlp).unwrap();
            assert_eq!(decoded.from, Some(from));
            break
        }
        assert!(exercised, "no leading-zero scalar found in the search range");
    }

    #[test]
    fn recover_transaction_returns_sender() {
        let (key, from) = test_key();
        let tx = CeloTransactionRequest::new()
            .nonce(12)
            .gas(30000)
            .gas_price(4)
            .to("b94f5374fce5edbc8e2a8697c15331677e6ebf0b".parse::<Address>().unwrap())
            .value(99)
            .chain_id(44378u64);
        let raw = tx.rlp_signed(&sign(&tx, &key));

        let (decoded, recovered) = crate::types::recover_transaction(raw.as_ref()).unwrap();
        assert_eq!(recovered, from);
        assert_eq!(decoded.nonce, Some(U256::from(12)));
        assert_eq!(decoded.chain_id, Some(U64::from(44378u64)));
    }

    #[test]
    fn deserializes_rpc_shaped_requests() {
        let tx: CeloTransactionRequest = serde_json::from_str(
            r#"{
                "from": "0xf0f6f18bca1b28cd68e4357452947e021241e9ce",
                "to": "0x23ef145a395ea3fa3deb533b8a9e1b4c6c25d112",
                "gas": "0x5208",
                "gasPrice": "0x3b9aca00",
                "value": "0xde0b6b3a7640000",
                "nonce": "0x15",
                "gatewayFee": "0x2710",
                "feeCurrency": "0x765de816845861e75a25fca122bb6898b8b1282a"
            }"#,
        )
        .unwrap();
        assert_eq!(tx.gas, Some(U256::from(21000)));
        assert_eq!(tx.gateway_fee, Some(U256::from(10000)));
        assert!(tx.fee_currency.is_some());
        assert!(tx.chain_id.is_none());
    }
}
