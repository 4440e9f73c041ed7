//! The provider shim: local signing for wallet-held accounts, transparent
//! pass-through for everything else.

use crate::JsonRpcClient;
use async_trait::async_trait;
use celo_wallet_core::types::{Address, CeloTransactionRequest, TypedData, U256, U64};
use celo_wallet_signers::Wallet;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{
    fmt::Debug,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use tracing::{debug, trace};

/// Gateway fee attached to locally signed transactions when the node
/// supplied a recipient but the caller no amount.
pub const DEFAULT_GATEWAY_FEE: u64 = 10_000;

/// Errors the shim can produce, generic over the transport's and the
/// wallet's own error types.
#[derive(Debug, Error)]
pub enum CeloProviderError<PE, WE>
where
    PE: std::error::Error + Send + Sync + 'static,
    WE: std::error::Error + Send + Sync + 'static,
{
    /// The wrapped transport failed
    #[error(transparent)]
    Transport(PE),
    /// The wallet failed (unbound address, uninitialized remote wallet,
    /// signer I/O, ...)
    #[error(transparent)]
    Wallet(WE),
    /// Params/result (de)serialization failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// An intercepted call carried params the method does not accept
    #[error("invalid params for {method}: expected {expected}")]
    BadParams { method: String, expected: &'static str },
    /// A transaction without `from` cannot be dispatched to a signer
    #[error("transaction has no from address")]
    MissingFrom,
    /// `eth_coinbase` returned null, so the gateway fee recipient cannot be
    /// populated
    #[error("coinbase is null, we are not connected to a full node, cannot sign transactions locally")]
    MissingCoinbase,
    /// Computing a gas price in a non-native fee currency needs node support
    /// this shim does not have
    #[error("gas price for fee currency {0:?} cannot be computed locally, pass it explicitly")]
    FeeCurrencyGasPrice(Address),
    /// `net_version` returned something that is not a chain id
    #[error("could not parse net_version response: {0}")]
    InvalidChainId(String),
}

type ShimError<P, W> =
    CeloProviderError<<P as JsonRpcClient>::Error, <W as Wallet>::Error>;

/// Wraps a JSON-RPC transport and a wallet; see the crate docs for the
/// interception contract.
///
/// ```no_run
/// use celo_wallet_providers::{CeloProvider, Http, JsonRpcClient};
/// use celo_wallet_signers::LocalWallet;
/// use std::str::FromStr;
///
/// # async fn foo() -> Result<(), Box<dyn std::error::Error>> {
/// let wallet = LocalWallet::new();
/// wallet.add_account("0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef")?;
///
/// let provider = CeloProvider::new(Http::from_str("https://forno.celo.org")?, wallet);
/// let accounts: Vec<celo_wallet_core::types::Address> =
///     provider.request("eth_accounts", ()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CeloProvider<P, W> {
    inner: P,
    wallet: W,
    // lazily resolved once per provider, then reused for every filled tx
    chain_id: Mutex<Option<u64>>,
    gateway_fee_recipient: Mutex<Option<Address>>,
}

impl<P, W> CeloProvider<P, W> {
    /// Wraps the transport with local signing for `wallet`'s accounts.
    pub fn new(inner: P, wallet: W) -> Self {
        Self {
            inner,
            wallet,
            chain_id: Mutex::new(None),
            gateway_fee_recipient: Mutex::new(None),
        }
    }

    /// A reference to the wrapped transport.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// A reference to the wallet answering for local accounts.
    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    fn cached<T: Copy>(&self, cache: &Mutex<Option<T>>) -> Option<T> {
        *cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store<T: Copy>(&self, cache: &Mutex<Option<T>>, value: T) {
        *cache.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

impl<P, W> CeloProvider<P, W>
where
    P: JsonRpcClient,
    W: Wallet,
{
    async fn rpc<T, R>(&self, method: &str, params: T) -> Result<R, ShimError<P, W>>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        self.inner.request(method, params).await.map_err(CeloProviderError::Transport)
    }

    fn is_local_account(&self, address: Option<&Address>) -> Result<bool, ShimError<P, W>> {
        match address {
            Some(address) => {
                self.wallet.has_account(address).map_err(CeloProviderError::Wallet)
            }
            None => Ok(false),
        }
    }

    /// The connected network's chain id, resolved via `net_version` once and
    /// cached.
    pub async fn get_chain_id(&self) -> Result<u64, ShimError<P, W>> {
        if let Some(chain_id) = self.cached(&self.chain_id) {
            return Ok(chain_id)
        }
        let version: String = self.rpc("net_version", ()).await?;
        let chain_id =
            version.parse().map_err(|_| CeloProviderError::InvalidChainId(version))?;
        self.store(&self.chain_id, chain_id);
        Ok(chain_id)
    }

    /// The node's coinbase (the gateway fee recipient for locally signed
    /// transactions), cached after the first lookup.
    pub async fn get_coinbase(&self) -> Result<Address, ShimError<P, W>> {
        if let Some(coinbase) = self.cached(&self.gateway_fee_recipient) {
            return Ok(coinbase)
        }
        let coinbase: Option<Address> = self.rpc("eth_coinbase", ()).await?;
        let coinbase = coinbase.ok_or(CeloProviderError::MissingCoinbase)?;
        self.store(&self.gateway_fee_recipient, coinbase);
        Ok(coinbase)
    }

    /// The next nonce for `address`, including pending transactions.
    pub async fn get_nonce(&self, address: Address) -> Result<U256, ShimError<P, W>> {
        self.rpc("eth_getTransactionCount", (address, "pending")).await
    }

    /// The node's native-currency gas price.
    pub async fn get_gas_price(&self) -> Result<U256, ShimError<P, W>> {
        self.rpc("eth_gasPrice", ()).await
    }

    /// Asks the node for a gas estimate of `tx`.
    pub async fn estimate_gas(
        &self,
        tx: &CeloTransactionRequest,
    ) -> Result<U256, ShimError<P, W>> {
        self.rpc("eth_estimateGas", [tx]).await
    }

    /// Populates every field signing needs but the caller left out:
    /// chain id, nonce, gas, gateway fee recipient/amount and gas price.
    pub async fn fill_transaction(
        &self,
        tx: &mut CeloTransactionRequest,
    ) -> Result<(), ShimError<P, W>> {
        if tx.replay_chain_id().is_none() {
            tx.chain_id = Some(U64::from(self.get_chain_id().await?));
        }

        if tx.nonce.is_none() {
            let from = tx.from.ok_or(CeloProviderError::MissingFrom)?;
            tx.nonce = Some(self.get_nonce(from).await?);
        }

        if is_empty(&tx.gas) {
            tx.gas = Some(self.estimate_gas(tx).await?);
        }

        if tx.gateway_fee_recipient.is_none() {
            tx.gateway_fee_recipient = Some(self.get_coinbase().await?);
        }
        if tx.gateway_fee_recipient.is_some() && tx.gateway_fee.is_none() {
            tx.gateway_fee = Some(U256::from(DEFAULT_GATEWAY_FEE));
        }

        if is_empty(&tx.gas_price) {
            match tx.fee_currency {
                // the node only quotes prices in the native currency
                Some(fee_currency) => {
                    return Err(CeloProviderError::FeeCurrencyGasPrice(fee_currency))
                }
                None => tx.gas_price = Some(self.get_gas_price().await?),
            }
        }

        Ok(())
    }

    async fn handle_send_transaction(&self, params: &Value) -> Result<Value, ShimError<P, W>> {
        let mut tx: CeloTransactionRequest = param(params, 0, "eth_sendTransaction", "a transaction object")?;
        self.fill_transaction(&mut tx).await?;
        let signed = self.wallet.sign_transaction(&tx).await.map_err(CeloProviderError::Wallet)?;
        debug!(hash = ?signed.hash, "submitting locally signed transaction");
        self.rpc("eth_sendRawTransaction", [signed.raw]).await
    }

    async fn handle_sign_transaction(&self, params: &Value) -> Result<Value, ShimError<P, W>> {
        let mut tx: CeloTransactionRequest = param(params, 0, "eth_signTransaction", "a transaction object")?;
        self.fill_transaction(&mut tx).await?;
        let signed = self.wallet.sign_transaction(&tx).await.map_err(CeloProviderError::Wallet)?;
        Ok(json!({ "raw": signed.raw, "tx": signed.tx }))
    }

    async fn handle_sign(
        &self,
        address: Address,
        data: &str,
    ) -> Result<Value, ShimError<P, W>> {
        let signature = self
            .wallet
            .sign_personal_message(address, data)
            .await
            .map_err(CeloProviderError::Wallet)?;
        Ok(Value::String(signature))
    }

    async fn handle_sign_typed_data(&self, params: &Value) -> Result<Value, ShimError<P, W>> {
        let address: Address = param(params, 0, "eth_signTypedData", "an address")?;
        let typed_data: TypedData = param(params, 1, "eth_signTypedData", "a typed data object")?;
        let signature = self
            .wallet
            .sign_typed_data(address, &typed_data)
            .await
            .map_err(CeloProviderError::Wallet)?;
        Ok(Value::String(signature))
    }
}

#[async_trait]
impl<P, W> JsonRpcClient for CeloProvider<P, W>
where
    P: JsonRpcClient,
    W: Wallet + Debug,
{
    type Error = ShimError<P, W>;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        trace!(method, ?params, "rpc payload");

        // Only the signing-related calls are inspected; every other method is
        // forwarded with its params untouched.
        let intercepted = matches!(
            method,
            "eth_accounts" |
                "eth_sendTransaction" |
                "eth_signTransaction" |
                "eth_sign" |
                "personal_sign" |
                "eth_signTypedData"
        );
        if !intercepted {
            return self.rpc(method, params).await
        }

        let params = serde_json::to_value(params)?;
        let result: Value = match method {
            "eth_accounts" => {
                let accounts =
                    self.wallet.accounts().map_err(CeloProviderError::Wallet)?;
                serde_json::to_value(accounts)?
            }
            "eth_sendTransaction" | "eth_signTransaction" => {
                let tx: CeloTransactionRequest = param(&params, 0, method, "a transaction object")?;
                if self.is_local_account(tx.from.as_ref())? {
                    if method == "eth_sendTransaction" {
                        self.handle_send_transaction(&params).await?
                    } else {
                        self.handle_sign_transaction(&params).await?
                    }
                } else {
                    self.rpc(method, &params).await?
                }
            }
            "eth_sign" | "personal_sign" => {
                // eth_sign is [address, data]; personal_sign is [data, address]
                let (address_index, data_index) = if method == "eth_sign" { (0, 1) } else { (1, 0) };
                let address: Address = param(&params, address_index, method, "an address")?;
                let data: String = param(&params, data_index, method, "a hex payload")?;
                if self.is_local_account(Some(&address))? {
                    self.handle_sign(address, &data).await?
                } else {
                    self.rpc(method, &params).await?
                }
            }
            "eth_signTypedData" => {
                let address: Address = param(&params, 0, method, "an address")?;
                if self.is_local_account(Some(&address))? {
                    self.handle_sign_typed_data(&params).await?
                } else {
                    self.rpc(method, &params).await?
                }
            }
            _ => unreachable!("interception list is exhaustive"),
        };

        Ok(serde_json::from_value(result)?)
    }
}

fn is_empty(value: &Option<U256>) -> bool {
    value.map_or(true, |value| value.is_zero())
}

fn param<PE, WE, T>(
    params: &Value,
    index: usize,
    method: &str,
    expected: &'static str,
) -> Result<T, CeloProviderError<PE, WE>>
where
    PE: std::error::Error + Send + Sync + 'static,
    WE: std::error::Error + Send + Sync + 'static,
    T: DeserializeOwned,
{
    params
        .get(index)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .ok_or_else(|| CeloProviderError::BadParams { method: method.to_string(), expected })
}
