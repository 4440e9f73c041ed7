//! Clients for talking to celo nodes, plus the provider shim that signs
//! locally for wallet-held accounts.
//!
//! The [`CeloProvider`] wraps any [`JsonRpcClient`] transport and a wallet:
//! signing-related calls whose `from` address the wallet holds are served
//! locally (with `eth_sendTransaction` turned into a raw submission); every
//! other call passes through to the node unmodified, so callers never need
//! to know where an account's key actually lives.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

mod transports;
pub use transports::{
    Http, HttpClientError, JsonRpcError, MockError, MockProvider, MockResponse, Request, Response,
    ResponseData,
};

mod provider;
pub use provider::{CeloProvider, CeloProviderError, DEFAULT_GATEWAY_FEE};

/// Trait which must be implemented by data transports to be used with a
/// celo node.
#[async_trait]
pub trait JsonRpcClient: Debug + Send + Sync {
    /// A JSON-RPC Error
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends a request with the provided JSON-RPC and parameters serialized
    /// as JSON
    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send;
}
