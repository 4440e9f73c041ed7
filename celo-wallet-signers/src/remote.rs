//! Wallets whose account list must be discovered asynchronously (hardware
//! devices, remote HSMs).

use crate::{
    wallet::{Wallet, WalletBase, WalletError},
    Signer,
};
use async_trait::async_trait;
use celo_wallet_core::types::{Address, CeloTransactionRequest, EncodedTransaction, TypedData};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::{sync::Mutex, time::timeout};
use tracing::debug;

/// How long an `init()` caller waits on an in-flight discovery pass before
/// giving up.
pub const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shorthand for the error type a [`RemoteWallet`] over loader `L` produces.
pub type RemoteWalletError<L> =
    WalletError<<<L as AccountLoader>::Signer as Signer>::Error>;

/// The discovery extension point each concrete remote wallet implements:
/// fetch whatever the backend knows about and return the discovered
/// address → signer bindings, in discovery order.
#[async_trait]
pub trait AccountLoader: Send + Sync {
    type Signer: Signer;

    async fn load_account_signers(
        &self,
    ) -> Result<Vec<(Address, Self::Signer)>, <Self::Signer as Signer>::Error>;
}

/// A wallet over async-discovered signers.
///
/// Discovery runs at most once: the first `init()` caller performs it while
/// holding the setup lock, concurrent callers wait on the same lock (bounded
/// by the configured timeout) and observe the completion flag instead of
/// racing a second discovery. Every accessor asserts that discovery has
/// finished, so operating on a silently empty wallet is impossible.
pub struct RemoteWallet<L: AccountLoader> {
    loader: L,
    base: WalletBase<L::Signer>,
    setup_finished: AtomicBool,
    setup_lock: Mutex<()>,
    init_timeout: Duration,
}

impl<L: AccountLoader> std::fmt::Debug for RemoteWallet<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWallet")
            .field("initialized", &self.is_setup_finished())
            .field("base", &self.base)
            .finish()
    }
}

impl<L: AccountLoader> RemoteWallet<L> {
    /// Creates an uninitialized wallet around the given loader.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            base: WalletBase::new(),
            setup_finished: AtomicBool::new(false),
            setup_lock: Mutex::new(()),
            init_timeout: INIT_TIMEOUT,
        }
    }

    /// Overrides the bound on how long `init()` waits for an in-flight
    /// discovery pass.
    pub fn set_init_timeout(&mut self, init_timeout: Duration) {
        self.init_timeout = init_timeout;
    }

    /// Discovers the backend's accounts and caches the resulting signers.
    /// Idempotent, so multiple (including concurrent) calls are benign.
    pub async fn init(&self) -> Result<(), RemoteWalletError<L>> {
        if self.setup_finished.load(Ordering::Acquire) {
            return Ok(())
        }

        let _setup = timeout(self.init_timeout, self.setup_lock.lock())
            .await
            .map_err(|_| WalletError::InitTimeout)?;
        if self.setup_finished.load(Ordering::Acquire) {
            // somebody else finished while we waited for the lock
            return Ok(())
        }

        debug!("discovering remote wallet accounts");
        let signers =
            self.loader.load_account_signers().await.map_err(WalletError::Signer)?;
        for (address, signer) in signers {
            self.base.add_signer(address, signer);
        }
        self.setup_finished.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether discovery has completed.
    pub fn is_setup_finished(&self) -> bool {
        self.setup_finished.load(Ordering::Acquire)
    }

    pub(crate) fn loader(&self) -> &L {
        &self.loader
    }

    fn initialization_required(&self) -> Result<(), RemoteWalletError<L>> {
        if !self.is_setup_finished() {
            return Err(WalletError::NotInitialized)
        }
        Ok(())
    }

    /// Gets the list of discovered accounts.
    pub fn get_accounts(&self) -> Result<Vec<Address>, RemoteWalletError<L>> {
        self.initialization_required()?;
        Ok(self.base.get_accounts())
    }

    /// Returns true if the account was discovered.
    pub fn has_account(&self, address: &Address) -> Result<bool, RemoteWalletError<L>> {
        self.initialization_required()?;
        Ok(self.base.has_account(address))
    }

    /// Signs the transaction using the signer discovered for its `from`
    /// address.
    pub async fn sign_transaction(
        &self,
        tx: &CeloTransactionRequest,
    ) -> Result<EncodedTransaction, RemoteWalletError<L>> {
        self.initialization_required()?;
        self.base.sign_transaction(tx).await
    }

    /// Signs a personal message (0x-prefixed hex payload) with the signer
    /// discovered for `address`.
    pub async fn sign_personal_message(
        &self,
        address: Address,
        data: &str,
    ) -> Result<String, RemoteWalletError<L>> {
        self.initialization_required()?;
        self.base.sign_personal_message(address, data).await
    }

    /// Signs an EIP-712 typed-data object with the signer discovered for
    /// `address`.
    pub async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<String, RemoteWalletError<L>> {
        self.initialization_required()?;
        self.base.sign_typed_data(address, typed_data).await
    }
}

#[async_trait]
impl<L> Wallet for RemoteWallet<L>
where
    L: AccountLoader + 'static,
{
    type Error = RemoteWalletError<L>;

    fn accounts(&self) -> Result<Vec<Address>, Self::Error> {
        self.get_accounts()
    }

    fn has_account(&self, address: &Address) -> Result<bool, Self::Error> {
        RemoteWallet::has_account(self, address)
    }

    async fn sign_transaction(
        &self,
        tx: &CeloTransactionRequest,
    ) -> Result<EncodedTransaction, Self::Error> {
        RemoteWallet::sign_transaction(self, tx).await
    }

    async fn sign_personal_message(
        &self,
        address: Address,
        data: &str,
    ) -> Result<String, Self::Error> {
        RemoteWallet::sign_personal_message(self, address, data).await
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<String, Self::Error> {
        RemoteWallet::sign_typed_data(self, address, typed_data).await
    }
}
