//! Initialization-protocol tests for the async-discovered wallet.

use async_trait::async_trait;
use celo_wallet_core::types::Address;
use celo_wallet_signers::{
    AccountLoader, LocalSigner, LocalSignerError, RemoteWallet, WalletError,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

const PRIVATE_KEY: &str = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";

/// Discovers one local signer after `delay`, counting discovery passes.
struct CountingLoader {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
}

impl CountingLoader {
    fn new(delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Self { calls: Arc::clone(&calls), delay, fail: false }, calls)
    }
}

#[async_trait]
impl AccountLoader for CountingLoader {
    type Signer = LocalSigner;

    async fn load_account_signers(
        &self,
    ) -> Result<Vec<(Address, LocalSigner)>, LocalSignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delay).await;
        if self.fail {
            // any construction error stands in for "the backend is broken"
            return Err(LocalSignerError::InvalidKeyLength)
        }
        let signer = LocalSigner::new(PRIVATE_KEY)?;
        let address = signer.address();
        Ok(vec![(address, signer)])
    }
}

#[tokio::test(start_paused = true)]
async fn accessors_fail_before_initialization() {
    let (loader, _) = CountingLoader::new(Duration::ZERO);
    let wallet = RemoteWallet::new(loader);

    let err = wallet.get_accounts().unwrap_err();
    assert_eq!(err.to_string(), "wallet needs to be initialized first");
    assert!(matches!(err, WalletError::NotInitialized));
    assert!(matches!(wallet.has_account(&Address::zero()), Err(WalletError::NotInitialized)));
}

#[tokio::test(start_paused = true)]
async fn init_registers_discovered_accounts() {
    let (loader, calls) = CountingLoader::new(Duration::from_millis(100));
    let wallet = RemoteWallet::new(loader);

    wallet.init().await.unwrap();
    assert!(wallet.is_setup_finished());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let accounts = wallet.get_accounts().unwrap();
    assert_eq!(accounts.len(), 1);
    assert!(wallet.has_account(&accounts[0]).unwrap());
}

#[tokio::test(start_paused = true)]
async fn repeated_init_is_idempotent() {
    let (loader, calls) = CountingLoader::new(Duration::from_millis(100));
    let wallet = RemoteWallet::new(loader);

    wallet.init().await.unwrap();
    wallet.init().await.unwrap();
    wallet.init().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_init_runs_one_discovery_pass() {
    let (loader, calls) = CountingLoader::new(Duration::from_millis(500));
    let wallet = RemoteWallet::new(loader);

    let (a, b, c) = tokio::join!(wallet.init(), wallet.init(), wallet.init());
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(wallet.get_accounts().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn waiting_caller_times_out_when_discovery_hangs() {
    let (loader, calls) = CountingLoader::new(Duration::from_secs(3600));
    let mut wallet = RemoteWallet::new(loader);
    wallet.set_init_timeout(Duration::from_millis(100));
    let wallet = Arc::new(wallet);

    // first caller starts the (stuck) discovery pass
    let first = {
        let wallet = Arc::clone(&wallet);
        tokio::spawn(async move { wallet.init().await })
    };
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // a second caller must give up after the bound, not start a second pass
    let err = wallet.init().await.unwrap_err();
    assert!(matches!(err, WalletError::InitTimeout));
    assert!(err.to_string().contains("took too long"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!wallet.is_setup_finished());

    first.abort();
}

#[tokio::test(start_paused = true)]
async fn failed_discovery_leaves_wallet_uninitialized() {
    let (mut loader, calls) = CountingLoader::new(Duration::ZERO);
    loader.fail = true;
    let wallet = RemoteWallet::new(loader);

    assert!(matches!(wallet.init().await, Err(WalletError::Signer(_))));
    assert!(!wallet.is_setup_finished());
    assert!(matches!(wallet.get_accounts(), Err(WalletError::NotInitialized)));

    // a later caller may retry the discovery
    assert!(wallet.init().await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
