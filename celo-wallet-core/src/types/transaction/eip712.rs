//! EIP-712 typed structured data hashing.
//!
//! Messages arrive as dynamic JSON (`eth_signTypedData` payloads), so the
//! encoder walks the declared type table at runtime instead of relying on
//! derive machinery. The resulting digest is what wallets feed to the
//! signer's personal-message path.
use crate::{
    types::{Address, U256},
    utils::keccak256,
};
use ethabi::Token;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Custom types for [`TypedData`]
pub type Eip712Types = BTreeMap<String, Vec<Eip712DomainType>>;

/// An EIP-712 error.
#[derive(Debug, Error)]
pub enum Eip712Error {
    #[error("unrecognized type {0} is not included in the EIP-712 type list")]
    UnknownType(String),
    #[error("no value provided for field {0}")]
    MissingField(String),
    #[error("cannot encode {value} as EIP-712 type {kind}")]
    InvalidValue { kind: String, value: String },
    #[error("failed to decode hex value: {0}")]
    FromHexError(#[from] hex::FromHexError),
    #[error("failed to make struct hash from values")]
    FailedToEncodeStruct,
}

/// Represents the name and type pair of a struct member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Eip712DomainType {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

/// A dynamic EIP-712 typed-data payload.
///
/// The signing domain is hashed through the `EIP712Domain` entry of the
/// declared type table, exactly like the message itself, so non-standard
/// domain shapes (extra or missing members) hash the way the dapp declared
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedData {
    /// The custom types used by this message.
    pub types: Eip712Types,
    /// The type of the message.
    #[serde(rename = "primaryType")]
    pub primary_type: String,
    /// Signing domain metadata.
    pub domain: BTreeMap<String, Value>,
    /// The message to be signed.
    pub message: BTreeMap<String, Value>,
}

impl TypedData {
    /// Hash the typed message according to EIP-712.
    ///
    /// The digest input starts with the `0x1901` prefix, followed by the
    /// domain struct hash, then (unless the primary type is the domain
    /// itself) the message struct hash. The result is hashed once more.
    pub fn encode_eip712(&self) -> Result<[u8; 32], Eip712Error> {
        let mut digest_input = vec![0x19, 0x01];
        digest_input.extend(struct_hash("EIP712Domain", &self.domain, &self.types)?);

        if self.primary_type != "EIP712Domain" {
            // compatibility with <https://github.com/MetaMask/eth-sig-util>
            digest_input.extend(struct_hash(&self.primary_type, &self.message, &self.types)?);
        }
        Ok(keccak256(digest_input))
    }
}

/// Creates the string encoding of a type, inclusive of its transitive
/// dependencies, e.g.
/// `"Mail(Person from,Person to,string contents)Person(string name,address wallet)"`.
pub fn encode_type(primary_type: &str, types: &Eip712Types) -> Result<String, Eip712Error> {
    let mut deps = BTreeSet::new();
    find_dependencies(primary_type, types, &mut deps)?;
    deps.remove(primary_type);

    // the primary type leads; dependencies follow alphabetically
    let mut result = String::new();
    for dep in std::iter::once(primary_type).chain(deps.iter().map(String::as_str)) {
        let fields = types.get(dep).ok_or_else(|| Eip712Error::UnknownType(dep.to_string()))?;
        result.push_str(dep);
        result.push('(');
        let members = fields
            .iter()
            .map(|field| format!("{} {}", field.r#type, field.name))
            .collect::<Vec<_>>()
            .join(",");
        result.push_str(&members);
        result.push(')');
    }
    Ok(result)
}

/// Keccak-256 of the [`encode_type`] string.
pub fn type_hash(primary_type: &str, types: &Eip712Types) -> Result<[u8; 32], Eip712Error> {
    Ok(keccak256(encode_type(primary_type, types)?))
}

/// Hashes a struct instance: `keccak256(typeHash ‖ enc(value₁) ‖ … ‖ enc(valueₙ))`.
pub fn struct_hash(
    primary_type: &str,
    object: &BTreeMap<String, Value>,
    types: &Eip712Types,
) -> Result<[u8; 32], Eip712Error> {
    let fields =
        types.get(primary_type).ok_or_else(|| Eip712Error::UnknownType(primary_type.to_string()))?;

    let mut encoded = type_hash(primary_type, types)?.to_vec();
    for field in fields {
        let value = object
            .get(&field.name)
            .ok_or_else(|| Eip712Error::MissingField(field.name.clone()))?;
        encoded.extend(encode_value(&field.r#type, value, types)?);
    }
    Ok(keccak256(encoded))
}

/// Assembles the transitive dependency closure of `primary_type`
/// (inclusive), depth first.
fn find_dependencies(
    primary_type: &str,
    types: &Eip712Types,
    found: &mut BTreeSet<String>,
) -> Result<(), Eip712Error> {
    if found.contains(primary_type) || is_builtin(primary_type) {
        return Ok(())
    }
    if let Some(member) = array_member_type(primary_type) {
        return find_dependencies(member, types, found)
    }
    let fields = types
        .get(primary_type)
        .ok_or_else(|| Eip712Error::UnknownType(primary_type.to_string()))?;
    found.insert(primary_type.to_string());
    for field in fields {
        find_dependencies(&field.r#type, types, found)?;
    }
    Ok(())
}

/// Encodes a single value to its 32-byte EIP-712 word.
fn encode_value(kind: &str, value: &Value, types: &Eip712Types) -> Result<[u8; 32], Eip712Error> {
    // arrays hash over the concatenated encoding of their members; a fixed
    // length in the type is not checked against the value
    if let Some(member) = array_member_type(kind) {
        let members = value
            .as_array()
            .ok_or_else(|| invalid_value(kind, value))?;
        let mut concat = Vec::with_capacity(members.len() * 32);
        for member_value in members {
            concat.extend(encode_value(member, member_value, types)?);
        }
        return Ok(keccak256(concat))
    }

    // nested structs encode as their struct hash
    if types.contains_key(kind) {
        let object = match value {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => return Err(invalid_value(kind, value)),
        };
        return struct_hash(kind, &object, types)
    }

    match kind {
        // dynamic types encode as their hash
        "string" => {
            let s = value.as_str().ok_or_else(|| invalid_value(kind, value))?;
            Ok(keccak256(s.as_bytes()))
        }
        "bytes" => Ok(keccak256(bytes_from_value(kind, value)?)),
        "bool" => {
            let b = value.as_bool().ok_or_else(|| invalid_value(kind, value))?;
            encode_token(Token::Bool(b))
        }
        "address" => {
            let s = value.as_str().ok_or_else(|| invalid_value(kind, value))?;
            let address = s
                .strip_prefix("0x")
                .unwrap_or(s)
                .parse::<Address>()
                .map_err(|_| invalid_value(kind, value))?;
            encode_token(Token::Address(address))
        }
        _ => {
            if let Some(size) = kind.strip_prefix("bytes").and_then(|n| n.parse::<usize>().ok()) {
                if size == 0 || size > 32 {
                    return Err(Eip712Error::UnknownType(kind.to_string()))
                }
                let bytes = bytes_from_value(kind, value)?;
                if bytes.len() > size {
                    return Err(invalid_value(kind, value))
                }
                return encode_token(Token::FixedBytes(bytes))
            }
            if kind.starts_with("uint") || kind.starts_with("int") {
                let signed = kind.starts_with("int");
                let bits: usize = kind
                    .trim_start_matches("uint")
                    .trim_start_matches("int")
                    .parse()
                    .map_err(|_| Eip712Error::UnknownType(kind.to_string()))?;
                if bits == 0 || bits > 256 || bits % 8 != 0 {
                    return Err(Eip712Error::UnknownType(kind.to_string()))
                }
                let number = number_from_value(kind, value)?;
                return encode_token(if signed { Token::Int(number) } else { Token::Uint(number) })
            }
            Err(Eip712Error::UnknownType(kind.to_string()))
        }
    }
}

fn encode_token(token: Token) -> Result<[u8; 32], Eip712Error> {
    ethabi::encode(&[token])
        .try_into()
        .map_err(|_| Eip712Error::FailedToEncodeStruct)
}

/// `bytes`-ish values accept 0x-hex or plain UTF-8 payloads, mirroring the
/// tolerance of the JSON-RPC surface this feeds from.
fn bytes_from_value(kind: &str, value: &Value) -> Result<Vec<u8>, Eip712Error> {
    let s = value.as_str().ok_or_else(|| invalid_value(kind, value))?;
    match s.strip_prefix("0x") {
        Some(stripped) => Ok(hex::decode(stripped)?),
        None => Ok(s.as_bytes().to_vec()),
    }
}

fn number_from_value(kind: &str, value: &Value) -> Result<U256, Eip712Error> {
    match value {
        Value::Number(n) => {
            if let Some(unsigned) = n.as_u64() {
                Ok(U256::from(unsigned))
            } else if let Some(signed) = n.as_i64() {
                // two's complement for negative ints
                Ok(U256::MAX - U256::from(signed.unsigned_abs()) + U256::one())
            } else {
                Err(invalid_value(kind, value))
            }
        }
        Value::String(s) => match s.strip_prefix("0x") {
            Some(stripped) => {
                U256::from_str_radix(stripped, 16).map_err(|_| invalid_value(kind, value))
            }
            None => U256::from_dec_str(s).map_err(|_| invalid_value(kind, value)),
        },
        _ => Err(invalid_value(kind, value)),
    }
}

fn invalid_value(kind: &str, value: &Value) -> Eip712Error {
    Eip712Error::InvalidValue { kind: kind.to_string(), value: value.to_string() }
}

fn is_builtin(kind: &str) -> bool {
    matches!(kind, "string" | "bytes" | "bool" | "address") ||
        kind.strip_prefix("bytes").map_or(false, |n| n.parse::<usize>().is_ok()) ||
        kind.strip_prefix("uint").map_or(false, |n| n.parse::<usize>().is_ok()) ||
        kind.strip_prefix("int").map_or(false, |n| n.parse::<usize>().is_ok())
}

/// For `T[]`/`T[k]` array type strings, returns `T`.
fn array_member_type(kind: &str) -> Option<&str> {
    kind.strip_suffix(']')
        .and_then(|prefix| prefix.rsplit_once('['))
        .map(|(member, _len)| member)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sample data from the official EIP-712 example:
    // https://github.com/ethereum/EIPs/blob/master/assets/eip-712/Example.js
    fn mail_typed_data() -> TypedData {
        serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "Person": [
                    { "name": "name", "type": "string" },
                    { "name": "wallet", "type": "address" }
                ],
                "Mail": [
                    { "name": "from", "type": "Person" },
                    { "name": "to", "type": "Person" },
                    { "name": "contents", "type": "string" }
                ]
            },
            "primaryType": "Mail",
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "message": {
                "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
                "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
                "contents": "Hello, Bob!"
            }
        }))
        .unwrap()
    }

    #[test]
    fn mail_type_encoding() {
        let typed_data = mail_typed_data();
        assert_eq!(
            encode_type("Mail", &typed_data.types).unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
        assert_eq!(
            hex::encode(type_hash("Mail", &typed_data.types).unwrap()),
            "a0cedeb2dc280ba39b857546d74f5549c3a1d7bdc2dd96bf881f76108e23dac2"
        );
    }

    #[test]
    fn mail_domain_separator() {
        let typed_data = mail_typed_data();
        assert_eq!(
            hex::encode(
                struct_hash("EIP712Domain", &typed_data.domain, &typed_data.types).unwrap()
            ),
            "f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
    }

    #[test]
    fn mail_digest() {
        let typed_data = mail_typed_data();
        assert_eq!(
            hex::encode(typed_data.encode_eip712().unwrap()),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut typed_data = mail_typed_data();
        typed_data.primary_type = "Postcard".to_string();
        assert!(matches!(
            typed_data.encode_eip712(),
            Err(Eip712Error::UnknownType(t)) if t == "Postcard"
        ));
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut typed_data = mail_typed_data();
        typed_data.message.remove("contents");
        assert!(matches!(
            typed_data.encode_eip712(),
            Err(Eip712Error::MissingField(f)) if f == "contents"
        ));
    }

    #[test]
    fn arrays_and_fixed_bytes_encode() {
        let typed_data: TypedData = serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" }
                ],
                "Batch": [
                    { "name": "ids", "type": "uint256[]" },
                    { "name": "tag", "type": "bytes32" }
                ]
            },
            "primaryType": "Batch",
            "domain": { "name": "Batcher" },
            "message": {
                "ids": [1, 2, 3],
                "tag": "0x0102030000000000000000000000000000000000000000000000000000000000"
            }
        }))
        .unwrap();

        let digest = typed_data.encode_eip712().unwrap();

        // hashing is sensitive to every member of the array
        let mut altered = typed_data.clone();
        altered.message.insert("ids".into(), serde_json::json!([1, 2, 4]));
        assert_ne!(digest, altered.encode_eip712().unwrap());
    }
}
