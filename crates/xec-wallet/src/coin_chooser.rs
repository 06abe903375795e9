//! Privacy-aware coin selection.
//!
//! Coins are grouped into buckets by the script they spend, so one
//! address is always spent in full. Buckets are drawn from confirmed
//! coins first, then unconfirmed, then unconfirmed with unconfirmed
//! parents. Among the sufficient candidate sets the one whose change
//! looks most like the payments wins. Change is split and rounded to
//! resemble the payment amounts.
//!
//! All randomness comes from [`Prng`] seeded with the coin set, so the
//! same coins and outputs always give the same transaction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use tracing::debug;
use xec_primitives::hash::sha256;
use xec_script::Address;
use xec_transaction::{Transaction, TransactionError, TxInput, TxOutput};

use crate::WalletError;

/// Outputs below this many satoshis are not created.
pub const DUST_THRESHOLD: u64 = 546;
/// Default standard transaction size limit.
pub const MAX_TX_SIZE: usize = 100_000;
/// Change below this is never split.
pub const CHANGE_SPLIT_FLOOR: u64 = 2_000_000;
/// Fee rates above this many satoshis per byte are refused.
pub const MAX_FEE_RATE: u64 = 100;
/// Serialized size of a P2PKH change output.
const CHANGE_OUTPUT_SIZE: usize = 34;
/// Excess change equal to this counts as much as one extra bucket.
const LARGE_CHANGE_UNIT: f64 = 500_000_000.0;

pub type FeeEstimator = Arc<dyn Fn(usize) -> u64 + Send + Sync>;

/// Coin selection settings.
#[derive(Clone)]
pub struct ChooserConfig {
    /// Fee in satoshis for a transaction of the given size in bytes.
    pub fee_estimator: FeeEstimator,
    pub max_change_outputs: usize,
    pub dust_threshold: u64,
    pub max_tx_size: usize,
    pub change_split_floor: u64,
    pub sign_schnorr: bool,
}

impl ChooserConfig {
    pub fn new(fee_estimator: impl Fn(usize) -> u64 + Send + Sync + 'static) -> Self {
        ChooserConfig {
            fee_estimator: Arc::new(fee_estimator),
            max_change_outputs: 10,
            dust_threshold: DUST_THRESHOLD,
            max_tx_size: MAX_TX_SIZE,
            change_split_floor: CHANGE_SPLIT_FLOOR,
            sign_schnorr: false,
        }
    }

    /// A linear fee of `sats_per_kb` per 1000 bytes.
    pub fn with_fee_rate(sats_per_kb: u64) -> Self {
        Self::new(move |size| size as u64 * sats_per_kb / 1000)
    }

    fn fee(&self, size: usize) -> u64 {
        (self.fee_estimator)(size)
    }
}

impl fmt::Debug for ChooserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChooserConfig")
            .field("max_change_outputs", &self.max_change_outputs)
            .field("dust_threshold", &self.dust_threshold)
            .field("max_tx_size", &self.max_tx_size)
            .field("change_split_floor", &self.change_split_floor)
            .field("sign_schnorr", &self.sign_schnorr)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------
// Deterministic PRNG
// -----------------------------------------------------------------------

/// SHA-256 hash chain used as a seeded byte stream.
#[derive(Clone, Debug)]
pub struct Prng {
    state: [u8; 32],
    pool: Vec<u8>,
}

impl Prng {
    pub fn new(seed: &[u8]) -> Self {
        Prng {
            state: sha256(seed),
            pool: Vec::new(),
        }
    }

    /// Seed from a coin set: sorted `txid ‖ n` strings, concatenated.
    pub fn from_coins(coins: &[TxInput]) -> Self {
        let mut ids: Vec<String> = coins
            .iter()
            .map(|c| format!("{}{}", c.outpoint.txid, c.outpoint.n))
            .collect();
        ids.sort();
        Self::new(ids.concat().as_bytes())
    }

    fn take(&mut self, n: usize) -> Vec<u8> {
        while self.pool.len() < n {
            self.pool.extend_from_slice(&self.state);
            self.state = sha256(&self.state);
        }
        self.pool.drain(..n).collect()
    }

    /// Uniform-ish integer in `[start, end)`. Returns `start` for an empty range.
    pub fn randint(&mut self, start: u64, end: u64) -> u64 {
        if end <= start {
            return start;
        }
        let n = (end - start) as u128;
        let (mut r, mut p) = (0u128, 1u128);
        while p < n {
            r = (r << 8) + self.take(1)[0] as u128;
            p <<= 8;
        }
        start + (r % n) as u64
    }

    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = self.randint(0, items.len() as u64) as usize;
        items.get(i)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.randint(0, i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}

impl RngCore for Prng {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let bytes = self.take(dest.len());
        dest.copy_from_slice(&bytes);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Buckets
// -----------------------------------------------------------------------

/// The coins of one spending script.
#[derive(Clone, Debug)]
pub struct Bucket {
    /// The script the coins are locked to, or their outpoint when unknown.
    pub desc: Vec<u8>,
    /// Serialized size of all inputs once signed.
    pub size: usize,
    pub value: u64,
    /// Indices into the coin list.
    pub coins: Vec<usize>,
    /// Lowest confirmation height. Zero is unconfirmed, negative means an
    /// unconfirmed parent.
    pub min_height: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tier {
    Confirmed,
    Unconfirmed,
    UnconfirmedParent,
}

impl Bucket {
    fn tier(&self) -> Tier {
        match self.min_height {
            h if h > 0 => Tier::Confirmed,
            0 => Tier::Unconfirmed,
            _ => Tier::UnconfirmedParent,
        }
    }
}

fn coin_value(coins: &[TxInput], i: usize) -> Result<u64, TransactionError> {
    coins[i].value().ok_or(TransactionError::InputValueMissing(i))
}

/// Sum of amounts, or `ValueOverflow` if it does not fit.
fn checked_total(values: impl IntoIterator<Item = u64>) -> Result<u64, TransactionError> {
    values
        .into_iter()
        .try_fold(0u64, u64::checked_add)
        .ok_or(TransactionError::ValueOverflow)
}

/// Group coins by the script they spend, in order of first appearance.
///
/// Fails with `ValueOverflow` unless the total of all coins fits in a
/// `u64`, so every sum over buckets is safe afterwards.
pub fn bucketize_coins(coins: &[TxInput], sign_schnorr: bool) -> Result<Vec<Bucket>, WalletError> {
    let mut by_desc: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut total = 0u64;
    for (i, coin) in coins.iter().enumerate() {
        let value = coin_value(coins, i)?;
        total = checked_total([total, value])?;
        let desc = match coin.preimage_script() {
            Ok(script) => script.into_bytes(),
            Err(_) => coin.outpoint.to_bytes().to_vec(),
        };
        let height = coin.height.unwrap_or(0);
        let slot = *by_desc.entry(desc.clone()).or_insert_with(|| {
            buckets.push(Bucket {
                desc,
                size: 0,
                value: 0,
                coins: Vec::new(),
                min_height: i32::MAX,
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.size += coin.size(sign_schnorr);
        bucket.value += value;
        bucket.coins.push(i);
        bucket.min_height = bucket.min_height.min(height);
    }
    Ok(buckets)
}

// -----------------------------------------------------------------------
// Chooser
// -----------------------------------------------------------------------

/// Totals a candidate bucket set is measured against.
struct Target<'a> {
    buckets: &'a [Bucket],
    spent: u64,
    base_size: usize,
    config: &'a ChooserConfig,
}

impl Target<'_> {
    /// Shortfall of `set` against outputs plus fee; zero when sufficient.
    fn shortfall(&self, set: &[usize]) -> u64 {
        let value: u64 = set.iter().map(|&b| self.buckets[b].value).sum();
        let size: usize = set.iter().map(|&b| self.buckets[b].size).sum();
        let needed = self
            .spent
            .saturating_add(self.config.fee(self.base_size + size));
        needed.saturating_sub(value)
    }

    fn sufficient(&self, set: &[usize]) -> bool {
        self.shortfall(set) == 0
    }

    /// Drop the lowest-value buckets while the rest still suffice.
    fn strip_unneeded(&self, set: &[usize]) -> Vec<usize> {
        let mut sorted = set.to_vec();
        sorted.sort_by_key(|&b| self.buckets[b].value);
        for i in 0..sorted.len() {
            if !self.sufficient(&sorted[i + 1..]) {
                return sorted[i..].to_vec();
            }
        }
        sorted
    }
}

/// Scores a candidate; lower is better.
struct Penalty {
    spent: u64,
    min_change: f64,
    max_change: f64,
}

impl Penalty {
    fn new(outputs: &[TxOutput], spent: u64) -> Self {
        let min = outputs.iter().map(|o| o.value).min().unwrap_or(0);
        let max = outputs.iter().map(|o| o.value).max().unwrap_or(0);
        Penalty {
            spent,
            min_change: min as f64 * 0.75,
            max_change: max as f64 * 1.33,
        }
    }

    fn score(&self, buckets: &[Bucket], set: &[usize]) -> f64 {
        let value: u64 = set.iter().map(|&b| buckets[b].value).sum();
        let change = value as f64 - self.spent as f64;
        let mut badness = set.len() as f64 - 1.0;
        if change < self.min_change {
            badness += (self.min_change - change) / (self.min_change + 10_000.0);
        } else if change > self.max_change {
            badness += (change - self.max_change) / (self.max_change + 10_000.0);
            badness += change / LARGE_CHANGE_UNIT;
        }
        badness
    }
}

/// Coin chooser with its seeded randomness.
#[derive(Debug)]
pub struct CoinChooser {
    prng: Prng,
}

impl CoinChooser {
    pub fn new(coins: &[TxInput]) -> Self {
        CoinChooser {
            prng: Prng::from_coins(coins),
        }
    }

    /// Candidate sets from `pool` that, on top of `selected`, suffice.
    ///
    /// Every sufficient singleton, plus the shortest sufficient prefix of
    /// a number of random permutations. `None` if the whole pool is short.
    fn candidates_any(
        &mut self,
        pool: &[usize],
        selected: &[usize],
        target: &Target<'_>,
    ) -> Option<Vec<Vec<usize>>> {
        if pool.is_empty() {
            return None;
        }
        let with_selected = |set: &[usize]| {
            let mut all = selected.to_vec();
            all.extend_from_slice(set);
            target.sufficient(&all)
        };

        let mut candidates: BTreeSet<Vec<usize>> = BTreeSet::new();
        for &b in pool {
            if with_selected(&[b]) {
                candidates.insert(vec![b]);
            }
        }

        let attempts = std::cmp::min(100, (pool.len() - 1) * 10 + 1);
        let mut permutation = pool.to_vec();
        for _ in 0..attempts {
            self.prng.shuffle(&mut permutation);
            let count = (1..=permutation.len()).find(|&k| with_selected(&permutation[..k]))?;
            let mut chosen = permutation[..count].to_vec();
            chosen.sort_unstable();
            candidates.insert(chosen);
        }
        Some(candidates.into_iter().collect())
    }

    /// Pick the bucket set to spend, preferring confirmed coins.
    pub fn choose_buckets(
        &mut self,
        buckets: &[Bucket],
        outputs: &[TxOutput],
        base_size: usize,
        config: &ChooserConfig,
    ) -> Result<Vec<usize>, WalletError> {
        let target = Target {
            buckets,
            spent: checked_total(outputs.iter().map(|o| o.value))?,
            base_size,
            config,
        };
        let mut selected: Vec<usize> = Vec::new();
        let mut found = None;
        for tier in [Tier::Confirmed, Tier::Unconfirmed, Tier::UnconfirmedParent] {
            let pool: Vec<usize> = (0..buckets.len())
                .filter(|&b| buckets[b].tier() == tier)
                .collect();
            if let Some(candidates) = self.candidates_any(&pool, &selected, &target) {
                found = Some(candidates);
                break;
            }
            debug!(?tier, buckets = pool.len(), "tier insufficient, falling back");
            selected.extend(pool);
        }

        let Some(candidates) = found else {
            let all: Vec<usize> = (0..buckets.len()).collect();
            return Err(WalletError::InsufficientFunds {
                shortfall: target.shortfall(&all),
            });
        };

        let penalty = Penalty::new(outputs, target.spent);
        let mut winner: Option<(f64, Vec<usize>)> = None;
        for candidate in &candidates {
            let mut full = selected.clone();
            full.extend_from_slice(candidate);
            let stripped = target.strip_unneeded(&full);
            let score = penalty.score(buckets, &stripped);
            if winner.as_ref().map_or(true, |(best, _)| score < *best) {
                winner = Some((score, stripped));
            }
        }
        let (score, chosen) = winner.unwrap_or_default();
        debug!(
            candidates = candidates.len(),
            buckets = chosen.len(),
            penalty = score,
            "chose buckets"
        );
        Ok(chosen)
    }

    /// Split the fee surplus of `tx` into up to `count` change amounts.
    ///
    /// `fee_for` gives the fee with `n` change outputs added.
    pub fn change_amounts(
        &mut self,
        tx: &Transaction,
        count: usize,
        fee_for: impl Fn(usize) -> u64,
        config: &ChooserConfig,
    ) -> Result<Vec<u64>, WalletError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let output_amounts: Vec<u64> = tx.outputs().iter().map(|o| o.value).collect();
        let largest = output_amounts.iter().copied().max().unwrap_or(0);
        let max_change = std::cmp::max(largest + largest / 4, config.change_split_floor);
        let surplus = tx.get_fee()?.max(0) as u64;

        let mut n = count;
        for k in 1..=count {
            if surplus.saturating_sub(fee_for(k)) / k as u64 <= max_change {
                n = k;
                break;
            }
        }
        let change = surplus.saturating_sub(fee_for(n));

        let zeroes: Vec<u32> = output_amounts.iter().map(|&v| trailing_zeroes(v)).collect();
        let min_z = zeroes.iter().copied().min().unwrap_or(0);
        let max_z = zeroes.iter().copied().max().unwrap_or(0);
        let precisions: Vec<u32> = (min_z.saturating_sub(1)..=max_z + 1).collect();

        let mut remaining = change;
        let mut amounts = Vec::with_capacity(n);
        while n > 1 {
            let average = remaining as f64 / n as f64;
            let amount = self
                .prng
                .randint((average * 0.7) as u64, (average * 1.3) as u64);
            let chosen = self.prng.choice(&precisions).copied().unwrap_or(0);
            let amount = round_to(amount, chosen.min(floor_log10(amount))).min(remaining);
            amounts.push(amount);
            remaining -= amount;
            n -= 1;
        }
        // The last share gives up at most two decimal places to the fee.
        let unit = 10u64.pow(precisions[0].min(2));
        amounts.push(remaining / unit * unit);
        Ok(amounts)
    }

    /// Build an unsigned transaction paying `outputs` from `coins`.
    ///
    /// Change goes to `change_addrs` in order; dust change is left to the
    /// fee. Inputs are shuffled and outputs sorted with the seeded PRNG.
    pub fn make_tx(
        &mut self,
        coins: &[TxInput],
        outputs: Vec<TxOutput>,
        change_addrs: &[Address],
        config: &ChooserConfig,
    ) -> Result<Transaction, WalletError> {
        if outputs.is_empty() {
            return Err(WalletError::InvalidArgument("no outputs".to_string()));
        }
        let mut tx = Transaction::from_io(Vec::new(), outputs, 0, config.sign_schnorr);
        let base_size = tx.estimated_size();

        let buckets = bucketize_coins(coins, config.sign_schnorr)?;
        let chosen = self.choose_buckets(&buckets, tx.outputs(), base_size, config)?;
        tx.add_inputs(
            chosen
                .iter()
                .flat_map(|&b| buckets[b].coins.iter())
                .map(|&i| coins[i].clone()),
        );
        let tx_size = base_size + chosen.iter().map(|&b| buckets[b].size).sum::<usize>();

        let count = change_addrs.len().min(config.max_change_outputs);
        let amounts = self.change_amounts(
            &tx,
            count,
            |n| config.fee(tx_size + n * CHANGE_OUTPUT_SIZE),
            config,
        )?;
        let (change, dust): (Vec<u64>, Vec<u64>) = amounts
            .into_iter()
            .partition(|&amount| amount >= config.dust_threshold);
        if !dust.is_empty() {
            debug!(dropped = dust.len(), total = dust.iter().sum::<u64>(), "dust change added to fee");
        }
        tx.add_outputs(
            change
                .into_iter()
                .zip(change_addrs)
                .map(|(amount, addr)| TxOutput::new(addr.clone(), amount)),
        );

        tx.shuffle_inputs(&mut self.prng);
        tx.sort_outputs(false, &mut self.prng);
        check_limits(&tx, config)?;
        debug!(
            inputs = tx.inputs().len(),
            outputs = tx.outputs().len(),
            size = tx.estimated_size(),
            "built transaction"
        );
        Ok(tx)
    }
}

/// Spend every coin, with output `max_index` taking whatever the other
/// outputs and the fee leave.
pub fn spend_max(
    coins: &[TxInput],
    mut outputs: Vec<TxOutput>,
    max_index: usize,
    config: &ChooserConfig,
) -> Result<Transaction, WalletError> {
    if max_index >= outputs.len() {
        return Err(WalletError::InvalidArgument(format!(
            "max output index {max_index} out of range"
        )));
    }
    let values = (0..coins.len())
        .map(|i| coin_value(coins, i))
        .collect::<Result<Vec<u64>, _>>()?;
    let sendable = checked_total(values)?;
    outputs[max_index].value = 0;
    let mut tx = Transaction::from_io(coins.to_vec(), outputs, 0, config.sign_schnorr);
    let fee = config.fee(tx.estimated_size());
    let needed = tx.output_value()?.saturating_add(fee);
    let amount = sendable.saturating_sub(needed);
    if amount < config.dust_threshold {
        return Err(WalletError::InsufficientFunds {
            shortfall: needed.saturating_add(config.dust_threshold).saturating_sub(sendable),
        });
    }
    let mut outputs = tx.outputs().to_vec();
    outputs[max_index].value = amount;
    tx.set_outputs(outputs);
    check_limits(&tx, config)?;
    Ok(tx)
}

fn check_limits(tx: &Transaction, config: &ChooserConfig) -> Result<(), WalletError> {
    let size = tx.estimated_size();
    if size > config.max_tx_size {
        return Err(WalletError::ExceedsMaxTxSize {
            size,
            max: config.max_tx_size,
        });
    }
    let fee = tx.get_fee()?.max(0) as u64;
    if fee > MAX_FEE_RATE * size as u64 {
        return Err(WalletError::ExcessiveFee { fee, size });
    }
    Ok(())
}

/// Trailing decimal zeroes; `0` counts as one.
fn trailing_zeroes(mut value: u64) -> u32 {
    if value == 0 {
        return 1;
    }
    let mut count = 0;
    while value % 10 == 0 {
        value /= 10;
        count += 1;
    }
    count
}

fn floor_log10(value: u64) -> u32 {
    value.checked_ilog10().unwrap_or(0)
}

/// Round half up to a multiple of `10^places`.
fn round_to(value: u64, places: u32) -> u64 {
    let unit = 10u64.pow(places);
    (value + unit / 2) / unit * unit
}
