//! Mock transport used in test environments.

use super::common::JsonRpcError;
use crate::JsonRpcClient;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    borrow::Borrow,
    collections::VecDeque,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;

/// Helper response type for [`MockProvider`], allowing custom JSON-RPC
/// errors to be provided: `Value` for successful responses, `Error` for
/// JSON-RPC errors.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Successful response with a [`serde_json::Value`]
    Value(Value),
    /// Error response with a [`JsonRpcError`]
    Error(JsonRpcError),
}

/// A transport that replays queued responses and records every request made
/// through it, for asserting on traffic in tests.
///
/// Responses are consumed newest-first (a stack), so queue them in reverse
/// order of the requests you expect.
#[derive(Clone, Debug, Default)]
pub struct MockProvider {
    requests: Arc<Mutex<VecDeque<(String, Value)>>>,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
}

#[async_trait]
impl JsonRpcClient for MockProvider {
    type Error = MockError;

    /// Pushes `(method, params)` onto the `requests` log, pops the next
    /// response off the `responses` stack
    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, MockError>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)?;
        self.lock(&self.requests).push_back((method.to_owned(), params));

        let next = self.lock(&self.responses).pop_back().ok_or(MockError::EmptyResponses)?;
        match next {
            MockResponse::Value(value) => Ok(serde_json::from_value(value)?),
            MockResponse::Error(error) => Err(MockError::JsonRpcError(error)),
        }
    }
}

impl MockProvider {
    /// Instantiates a mock transport
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(&self, field: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        field.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `data` as the response for the next un-asserted request.
    pub fn push<T: Serialize + Send + Sync, K: Borrow<T>>(&self, data: K) -> Result<(), MockError> {
        let value = serde_json::to_value(data.borrow())?;
        self.lock(&self.responses).push_back(MockResponse::Value(value));
        Ok(())
    }

    /// Queues a raw response (success or JSON-RPC error).
    pub fn push_response(&self, response: MockResponse) {
        self.lock(&self.responses).push_back(response);
    }

    /// Pops the oldest recorded request, if any.
    pub fn pop_request(&self) -> Option<(String, Value)> {
        self.lock(&self.requests).pop_front()
    }

    /// Number of requests made through this transport and not yet popped.
    pub fn request_count(&self) -> usize {
        self.lock(&self.requests).len()
    }

    /// Checks that the oldest recorded request matches `method` and `data`.
    pub fn assert_request<T: Serialize + Send + Sync>(
        &self,
        method: &str,
        data: T,
    ) -> Result<(), MockError> {
        let (recorded_method, recorded_params) =
            self.pop_request().ok_or(MockError::EmptyRequests)?;
        assert_eq!(recorded_method, method);
        assert_eq!(
            serde_json::to_value(data).expect("could not serialize data"),
            recorded_params
        );
        Ok(())
    }
}

#[derive(Error, Debug)]
/// Errors for the [`MockProvider`]
pub enum MockError {
    /// (De)Serialization error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Empty requests array
    #[error("empty requests array, please push some requests")]
    EmptyRequests,

    /// Empty responses array
    #[error("empty responses array, please push some responses")]
    EmptyResponses,

    /// Custom JsonRpcError
    #[error("JSON-RPC error: {0}")]
    JsonRpcError(JsonRpcError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use celo_wallet_core::types::U64;

    #[tokio::test]
    async fn pushes_and_pops() {
        let mock = MockProvider::new();
        mock.push::<U64, _>(U64::from(12)).unwrap();
        let block: U64 = mock.request("eth_blockNumber", ()).await.unwrap();
        assert_eq!(block.as_u64(), 12);
        mock.assert_request("eth_blockNumber", ()).unwrap();
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn empty_responses_error() {
        let mock = MockProvider::new();
        let err = mock.request::<_, U64>("eth_blockNumber", ()).await.unwrap_err();
        assert!(matches!(err, MockError::EmptyResponses));
    }
}
