//! A low-level JSON-RPC client over HTTP.

use super::common::{JsonRpcError, Request, Response};
use crate::JsonRpcClient;

use async_trait::async_trait;
use reqwest::{Client, Error as ReqwestError};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt::Debug,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use url::Url;

/// A JSON-RPC transport speaking HTTP.
///
/// # Example
///
/// ```no_run
/// use celo_wallet_providers::{Http, JsonRpcClient};
/// use celo_wallet_core::types::U64;
/// use std::str::FromStr;
///
/// # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = Http::from_str("https://forno.celo.org")?;
/// let block_number: U64 = provider.request("eth_blockNumber", ()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Http {
    id: AtomicU64,
    client: Client,
    url: Url,
}

impl Debug for Http {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Http {{ id: {:?}, url: {} }}", self.id, self.url)
    }
}

/// Error thrown when sending an HTTP request
#[derive(Error, Debug)]
pub enum ClientError {
    /// Thrown if the request failed
    #[error(transparent)]
    ReqwestError(#[from] ReqwestError),
    /// Thrown if the node responded with a JSON-RPC error
    #[error(transparent)]
    JsonRpcError(#[from] JsonRpcError),
    /// Thrown if the response could not be parsed
    #[error("Deserialization Error: {err}. Response: {text}")]
    SerdeJson {
        err: serde_json::Error,
        text: String,
    },
}

#[async_trait]
impl JsonRpcClient for Http {
    type Error = ClientError;

    /// Sends a POST request with the provided method and the params
    /// serialized as JSON over HTTP
    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, ClientError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let next_id = self.id.fetch_add(1, Ordering::SeqCst);
        let payload = Request::new(next_id, method, params);

        let res = self.client.post(self.url.as_ref()).json(&payload).send().await?;
        let body = res.bytes().await?;

        let response: Response<R> = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(err) => {
                return Err(ClientError::SerdeJson {
                    err,
                    text: String::from_utf8_lossy(&body).to_string(),
                })
            }
        };

        Ok(response.data.into_result()?)
    }
}

impl Http {
    /// Initializes a new HTTP client.
    ///
    /// # Example
    ///
    /// ```
    /// use celo_wallet_providers::Http;
    /// use url::Url;
    ///
    /// let url = Url::parse("http://localhost:8545").unwrap();
    /// let provider = Http::new(url);
    /// ```
    pub fn new(url: impl Into<Url>) -> Self {
        Self::new_with_client(url, Client::new())
    }

    /// Initializes the transport over a pre-configured [`reqwest::Client`]
    /// (proxies, custom timeouts, ...).
    pub fn new_with_client(url: impl Into<Url>, client: Client) -> Self {
        Self { id: AtomicU64::new(1), client, url: url.into() }
    }

    /// The URL requests are made to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl FromStr for Http {
    type Err = url::ParseError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Ok(Http::new(Url::parse(src)?))
    }
}

impl Clone for Http {
    fn clone(&self) -> Self {
        Self {
            id: AtomicU64::new(self.id.load(Ordering::SeqCst)),
            client: self.client.clone(),
            url: self.url.clone(),
        }
    }
}
