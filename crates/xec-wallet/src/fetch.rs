//! Background fetching of prior transactions.
//!
//! Prior transactions are only needed to fill in display fields such as
//! input values and fees. The worker de-duplicates requests against a
//! bounded shared cache, fetches the rest concurrently, and gives up
//! after a timeout. Dropping every [`FetchClient`] stops the worker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};
use xec_primitives::chainhash::Hash256;
use xec_transaction::Transaction;

use crate::WalletError;

const REQUEST_QUEUE: usize = 64;

/// Worker settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    pub cache_capacity: usize,
    /// Limit for one request, from dispatch to the last reply.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            cache_capacity: 1000,
            timeout: Duration::from_secs(10),
        }
    }
}

// -----------------------------------------------------------------------
// Cache
// -----------------------------------------------------------------------

#[derive(Default)]
struct CacheInner {
    txs: HashMap<Hash256, Arc<Transaction>>,
    order: VecDeque<Hash256>,
}

/// Bounded prior-transaction cache, shared by the worker and callers.
///
/// Evicts the oldest insertion once full.
pub struct PriorTxCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl PriorTxCache {
    pub fn new(capacity: usize) -> Self {
        PriorTxCache {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, txid: &Hash256) -> Option<Arc<Transaction>> {
        self.lock().txs.get(txid).cloned()
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.lock().txs.contains_key(txid)
    }

    pub fn insert(&self, txid: Hash256, tx: Arc<Transaction>) {
        let mut inner = self.lock();
        if inner.txs.insert(txid, tx).is_some() {
            return;
        }
        inner.order.push_back(txid);
        while inner.order.len() > self.capacity {
            if let Some(old) = inner.order.pop_front() {
                inner.txs.remove(&old);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -----------------------------------------------------------------------
// Provider
// -----------------------------------------------------------------------

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, WalletError>> + Send>>;

/// Source of raw transactions by id, e.g. an indexer client.
pub trait TxFetchProvider: Send + Sync + 'static {
    fn fetch_raw(&self, txid: Hash256) -> FetchFuture;
}

impl<F> TxFetchProvider for F
where
    F: Fn(Hash256) -> FetchFuture + Send + Sync + 'static,
{
    fn fetch_raw(&self, txid: Hash256) -> FetchFuture {
        self(txid)
    }
}

// -----------------------------------------------------------------------
// Worker
// -----------------------------------------------------------------------

/// Outcome of one request.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub found: HashMap<Hash256, Arc<Transaction>>,
    /// Ids the provider failed on or answered with a mismatching transaction.
    pub missing: Vec<Hash256>,
}

struct Request {
    txids: Vec<Hash256>,
    reply: oneshot::Sender<Result<FetchReport, WalletError>>,
}

/// Handle for submitting requests to the worker.
#[derive(Clone)]
pub struct FetchClient {
    sender: mpsc::Sender<Request>,
}

impl FetchClient {
    /// Fetch `txids`, from the cache where possible.
    pub async fn fetch(&self, txids: Vec<Hash256>) -> Result<FetchReport, WalletError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Request { txids, reply })
            .await
            .map_err(|_| WalletError::FetchCancelled)?;
        response.await.map_err(|_| WalletError::FetchCancelled)?
    }
}

/// Start the worker on the current tokio runtime.
pub fn spawn_fetch_worker<P: TxFetchProvider>(
    provider: P,
    cache: Arc<PriorTxCache>,
    config: FetchConfig,
) -> (FetchClient, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(REQUEST_QUEUE);
    let handle = tokio::spawn(run_worker(Arc::new(provider), cache, config, receiver));
    (FetchClient { sender }, handle)
}

async fn run_worker<P: TxFetchProvider>(
    provider: Arc<P>,
    cache: Arc<PriorTxCache>,
    config: FetchConfig,
    mut receiver: mpsc::Receiver<Request>,
) {
    debug!(capacity = config.cache_capacity, "fetch worker started");
    while let Some(request) = receiver.recv().await {
        let result = serve(&provider, &cache, &config, request.txids).await;
        if request.reply.send(result).is_err() {
            debug!("fetch requester went away");
        }
    }
    debug!("fetch worker stopped");
}

async fn serve<P: TxFetchProvider>(
    provider: &Arc<P>,
    cache: &PriorTxCache,
    config: &FetchConfig,
    txids: Vec<Hash256>,
) -> Result<FetchReport, WalletError> {
    let mut report = FetchReport::default();
    let mut outstanding: HashSet<Hash256> = HashSet::new();
    let mut tasks = JoinSet::new();
    for txid in txids {
        if report.found.contains_key(&txid) || outstanding.contains(&txid) {
            continue;
        }
        if let Some(tx) = cache.get(&txid) {
            report.found.insert(txid, tx);
            continue;
        }
        outstanding.insert(txid);
        let provider = Arc::clone(provider);
        tasks.spawn(async move { (txid, provider.fetch_raw(txid).await) });
    }

    let deadline = tokio::time::Instant::now() + config.timeout;
    loop {
        let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(joined)) => joined,
            Ok(None) => break,
            Err(_) => {
                let pending = outstanding.len();
                warn!(pending, "prior transaction fetch timed out");
                tasks.abort_all();
                return Err(WalletError::FetchTimeout { pending });
            }
        };
        let (txid, raw) = match joined {
            Ok(done) => done,
            Err(err) => {
                warn!(%err, "fetch task failed");
                continue;
            }
        };
        outstanding.remove(&txid);
        match raw.and_then(|raw| decode_matching(txid, &raw)) {
            Ok(tx) => {
                let tx = Arc::new(tx);
                cache.insert(txid, Arc::clone(&tx));
                report.found.insert(txid, tx);
            }
            Err(err) => {
                debug!(%txid, %err, "prior transaction unavailable");
                report.missing.push(txid);
            }
        }
    }
    // Tasks that panicked never reported back.
    report.missing.extend(outstanding);
    report.missing.sort();
    Ok(report)
}

fn decode_matching(txid: Hash256, raw: &[u8]) -> Result<Transaction, WalletError> {
    if Hash256::digest(raw) != txid {
        return Err(WalletError::Provider(format!("response does not hash to {txid}")));
    }
    Ok(Transaction::from_bytes(raw)?)
}

/// Prior txids referenced by inputs of `tx` whose value is unknown.
pub fn missing_prior_txids(tx: &Transaction) -> Vec<Hash256> {
    let mut seen = HashSet::new();
    tx.inputs()
        .iter()
        .filter(|input| input.value().is_none() && !input.is_coinbase())
        .map(|input| input.outpoint.txid)
        .filter(|txid| seen.insert(*txid))
        .collect()
}

/// Fill unknown input values from cached prior transactions.
///
/// # Returns
/// The number of inputs filled.
pub fn fill_input_values(tx: &mut Transaction, cache: &PriorTxCache) -> usize {
    let mut filled = 0;
    for input in tx.inputs_mut() {
        if input.value().is_some() || input.is_coinbase() {
            continue;
        }
        let value = cache
            .get(&input.outpoint.txid)
            .and_then(|prev| prev.outputs().get(input.outpoint.n as usize).map(|o| o.value));
        if let Some(value) = value {
            input.set_value(value);
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use xec_script::Address;
    use xec_transaction::{OutPoint, TxInput, TxOutput};

    fn prior(tag: u8, values: &[u64]) -> (Hash256, Vec<u8>) {
        let input = TxInput::from_script_sig(
            OutPoint::new(Hash256::new([tag; 32]), 0),
            0xffff_ffff,
            vec![0x51],
        );
        let outputs = values
            .iter()
            .map(|&v| TxOutput::new(Address::from_p2pkh_hash([tag; 20]), v))
            .collect();
        let raw = Transaction::from_io(vec![input], outputs, 0, false).to_bytes();
        (Hash256::digest(&raw), raw)
    }

    struct MapProvider {
        txs: HashMap<Hash256, Vec<u8>>,
        calls: Arc<AtomicUsize>,
    }

    impl TxFetchProvider for MapProvider {
        fn fetch_raw(&self, txid: Hash256) -> FetchFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let raw = self.txs.get(&txid).cloned();
            Box::pin(async move { raw.ok_or_else(|| WalletError::Provider("unknown txid".into())) })
        }
    }

    fn provider(txs: &[(Hash256, Vec<u8>)]) -> (MapProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = MapProvider {
            txs: txs.iter().cloned().collect(),
            calls: Arc::clone(&calls),
        };
        (provider, calls)
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let cache = PriorTxCache::new(2);
        let tx = Arc::new(Transaction::new());
        for i in 0..3u8 {
            cache.insert(Hash256::new([i; 32]), Arc::clone(&tx));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&Hash256::new([0; 32])));
        assert!(cache.contains(&Hash256::new([2; 32])));
    }

    #[test]
    fn test_config_from_json() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"cache_capacity":5,"timeout":{"secs":2,"nanos":0}}"#).unwrap();
        assert_eq!(config.cache_capacity, 5);
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_dedups_and_caches() {
        let a = prior(1, &[1_000]);
        let b = prior(2, &[2_000, 3_000]);
        let (provider, calls) = provider(&[a.clone(), b.clone()]);
        let cache = Arc::new(PriorTxCache::new(10));
        let (client, _worker) = spawn_fetch_worker(provider, Arc::clone(&cache), FetchConfig::default());

        let report = client.fetch(vec![a.0, b.0, a.0]).await.unwrap();
        assert_eq!(report.found.len(), 2);
        assert!(report.missing.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let report = client.fetch(vec![b.0]).await.unwrap();
        assert_eq!(report.found[&b.0].outputs()[1].value, 3_000);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_mismatched_are_missing() {
        let (good_id, good_raw) = prior(1, &[1_000]);
        let (bad_id, _) = prior(2, &[5]);
        let unknown = Hash256::new([0xee; 32]);
        // Answer `bad_id` with the wrong transaction.
        let (provider, _) = provider(&[(good_id, good_raw.clone()), (bad_id, good_raw)]);
        let cache = Arc::new(PriorTxCache::new(10));
        let (client, _worker) = spawn_fetch_worker(provider, Arc::clone(&cache), FetchConfig::default());

        let report = client.fetch(vec![good_id, bad_id, unknown]).await.unwrap();
        assert_eq!(report.found.len(), 1);
        let mut expected = vec![bad_id, unknown];
        expected.sort();
        assert_eq!(report.missing, expected);
        assert!(!cache.contains(&bad_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let stall = |_txid: Hash256| -> FetchFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, WalletError>(Vec::new())
            })
        };
        let config = FetchConfig {
            cache_capacity: 4,
            timeout: Duration::from_secs(5),
        };
        let (client, _worker) = spawn_fetch_worker(stall, Arc::new(PriorTxCache::new(4)), config);
        let err = client
            .fetch(vec![Hash256::new([1; 32]), Hash256::new([2; 32])])
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::FetchTimeout { pending: 2 }));
    }

    #[tokio::test]
    async fn test_dropping_client_stops_worker() {
        let (provider, _) = provider(&[]);
        let (client, worker) =
            spawn_fetch_worker(provider, Arc::new(PriorTxCache::new(4)), FetchConfig::default());
        let other = client.clone();
        drop(client);
        drop(other);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_aborted_worker_cancels() {
        let (provider, _) = provider(&[]);
        let (client, worker) =
            spawn_fetch_worker(provider, Arc::new(PriorTxCache::new(4)), FetchConfig::default());
        worker.abort();
        let _ = worker.await;
        let err = client.fetch(vec![Hash256::new([1; 32])]).await.unwrap_err();
        assert!(matches!(err, WalletError::FetchCancelled));
    }

    #[tokio::test]
    async fn test_fill_input_values() {
        let (prev_id, prev_raw) = prior(3, &[700, 800]);
        let (provider, _) = provider(&[(prev_id, prev_raw)]);
        let cache = Arc::new(PriorTxCache::new(4));
        let (client, _worker) = spawn_fetch_worker(provider, Arc::clone(&cache), FetchConfig::default());

        let spend = TxInput::from_script_sig(OutPoint::new(prev_id, 1), 0, vec![0x51]);
        let mut tx = Transaction::from_io(
            vec![spend],
            vec![TxOutput::new(Address::from_p2pkh_hash([4; 20]), 600)],
            0,
            false,
        );
        assert_eq!(missing_prior_txids(&tx), vec![prev_id]);
        client.fetch(missing_prior_txids(&tx)).await.unwrap();
        assert_eq!(fill_input_values(&mut tx, &cache), 1);
        assert_eq!(tx.get_fee().unwrap(), 200);
        assert!(missing_prior_txids(&tx).is_empty());
    }
}
