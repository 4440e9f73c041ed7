//! Address, key and hashing utilities.

mod hash;
pub use hash::{hash_message, keccak256};

use crate::types::Address;
use elliptic_curve::sec1::ToEncodedPoint;
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    PublicKey,
};
use thiserror::Error;

/// An error while parsing an address from its string form.
#[derive(Debug, Error)]
pub enum AddressParseError {
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    #[error("addresses are 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// Parses a `0x`-optional hex string into a normalized [`Address`].
///
/// All internal wallet maps key on this form, so callers never compare raw
/// strings with mixed case or prefixes.
pub fn parse_address(value: &str) -> Result<Address, AddressParseError> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(value)?;
    if bytes.len() != 20 {
        return Err(AddressParseError::InvalidLength(bytes.len()))
    }
    Ok(Address::from_slice(&bytes))
}

/// Converts a K256 SigningKey to an Ethereum Address
pub fn secret_key_to_address(secret_key: &SigningKey) -> Address {
    public_key_to_address(secret_key.verifying_key())
}

/// Converts a K256 VerifyingKey to an Ethereum Address
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let public_key = PublicKey::from(key);
    let public_key = public_key.to_encoded_point(/* compress = */ false);
    let public_key = public_key.as_bytes();
    debug_assert_eq!(public_key[0], 0x04);
    let hash = keccak256(&public_key[1..]);
    Address::from_slice(&hash[12..])
}

/// Gets the checksummed, `0x`-prefixed string form of an address per
/// [EIP-55](https://eips.ethereum.org/EIPS/eip-55), with the optional
/// [EIP-1191](https://eips.ethereum.org/EIPS/eip-1191) chain id prefixed.
pub fn to_checksum(addr: &Address, chain_id: Option<u8>) -> String {
    let prefixed_addr = match chain_id {
        Some(chain_id) => format!("{chain_id}0x{addr:x}"),
        None => format!("{addr:x}"),
    };
    let hash = hex::encode(keccak256(prefixed_addr));
    let hash = hash.as_bytes();

    let addr_hex = hex::encode(addr.as_bytes());
    let addr_hex = addr_hex.as_bytes();

    addr_hex.iter().zip(hash).fold("0x".to_owned(), |mut encoded, (addr, hash)| {
        encoded.push(if *hash >= 56 {
            addr.to_ascii_uppercase() as char
        } else {
            *addr as char
        });
        encoded
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address_normalizes() {
        let a = parse_address("0xF0109fC8DF283027b6285cc889F5aA624EaC1F55").unwrap();
        let b = parse_address("f0109fc8df283027b6285cc889f5aa624eac1f55").unwrap();
        assert_eq!(a, b);

        assert!(matches!(parse_address("0x1234"), Err(AddressParseError::InvalidLength(2))));
        assert!(parse_address("not an address").is_err());
    }

    #[test]
    fn private_key_to_known_address() {
        // the address pair used throughout the wallet tests
        let key = SigningKey::from_slice(
            &hex::decode("1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef")
                .unwrap(),
        )
        .unwrap();
        let addr = secret_key_to_address(&key);
        assert_eq!(addr, public_key_to_address(key.verifying_key()));
    }

    // test vectors from https://eips.ethereum.org/EIPS/eip-55
    #[test]
    fn checksummed_addresses() {
        for addr in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let parsed = parse_address(addr).unwrap();
            assert_eq!(to_checksum(&parsed, None), *addr);
        }
    }
}
