//! Celo data types, transaction encoding and the cryptography shared by every
//! wallet backend.
//!
//! The crate is split in two halves:
//!
//! - [`types`] holds the chain data model: the celo-legacy
//!   [`CeloTransactionRequest`](types::CeloTransactionRequest) with its RLP
//!   encoding and signing-digest computation, the recoverable
//!   [`Signature`](types::Signature), EIP-712 [`TypedData`](types::TypedData)
//!   hashing and the 0x-hex [`Bytes`](types::Bytes) wrapper.
//! - [`utils`] holds the pure helpers: Keccak-256, the EIP-191 personal
//!   message hash and address derivation from secp256k1 keys.

#![deny(rustdoc::broken_intra_doc_links)]

pub mod types;
pub mod utils;

// Re-export the crypto crates so downstream users sign with the exact same
// curve implementation this crate recovers with, and the rlp crate so
// payloads can be inspected without a duplicate dependency.
pub use k256;
pub use rand;
pub use rlp;
