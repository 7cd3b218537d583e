use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::error::{DiffError, LogdirError};
use crate::record::{normalize, Record};

/// Tunables for one N-way reconciliation run. See spec.md §4.2.
#[derive(Debug, Clone)]
pub struct DiffConfig {
    pub max_skew: Duration,
    pub extreme_skew: Duration,
    pub reconcile_fields: Vec<String>,
}

/// One discrepancy: a trade id, the tags describing how its copies
/// disagree, and the per-source records (`None` where a source never
/// reported this trade). See spec.md §3.
#[derive(Debug, Clone)]
pub struct DiscrepancyRecord {
    pub trade_id: String,
    pub tags: Vec<String>,
    pub records: Vec<Option<Record>>,
}

struct PendingTrade {
    slots: Vec<Option<Record>>,
}

impl PendingTrade {
    fn new(n: usize) -> Self {
        Self {
            slots: vec![None; n],
        }
    }

    fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }
}

/// Consumes N already-sorted record streams (one `LogdirStream` per source,
/// though any `Iterator<Item = Result<Record, LogdirError>>` works, which
/// is what the unit tests below exercise) and yields one discrepancy per
/// trade id whose copies disagree or are incomplete. See spec.md §4.2.
pub struct NDiffer<I> {
    sources: Vec<I>,
    config: DiffConfig,

    /// At most one lookahead record per source, keyed by `(timestamp,
    /// source_index)` so ties break by source index ascending, per
    /// spec.md §4.2's tie-breaking rule.
    next_records: BTreeMap<(NaiveDateTime, usize), Record>,

    pending_trades: BTreeMap<String, PendingTrade>,
    /// Mirrors every filled slot in `pending_trades`, keyed by `(timestamp,
    /// source_index, trade_id)` for O(log n) oldest-lookup and
    /// deletion-by-key — a plain heap can't do the latter since eviction
    /// and reconciliation both remove interior elements, not just the
    /// minimum. See spec.md §9.
    pending_index: BTreeSet<(NaiveDateTime, usize, String)>,

    /// Snapshotted once, when `next_records` first goes empty, so the
    /// final flush iterates a fixed key set rather than one that mutates
    /// under it (spec.md §9's note on the reference's `pending_trades.keys()`
    /// flush).
    flush_queue: Option<VecDeque<String>>,

    done: bool,
}

impl<I> NDiffer<I>
where
    I: Iterator<Item = Result<Record, LogdirError>>,
{
    /// Pull one lookahead record from each source. A source that is
    /// immediately empty contributes nothing.
    pub fn new(mut sources: Vec<I>, config: DiffConfig) -> Result<Self, DiffError> {
        if sources.is_empty() {
            return Err(DiffError::NoSources);
        }

        let mut next_records = BTreeMap::new();
        for (idx, source) in sources.iter_mut().enumerate() {
            if let Some(record) = source.next().transpose()? {
                let ts = record
                    .timestamp()
                    .expect("LogdirStream always sets a full timestamp");
                next_records.insert((ts, idx), record);
            }
        }

        Ok(Self {
            sources,
            config,
            next_records,
            pending_trades: BTreeMap::new(),
            pending_index: BTreeSet::new(),
            flush_queue: None,
            done: false,
        })
    }

    fn n(&self) -> usize {
        self.sources.len()
    }

    /// Reconcile one trade: tag its disagreements, remove it from
    /// `pending_trades`/`pending_index`, and return a `DiscrepancyRecord`
    /// unless every copy agrees (silent success). See spec.md §4.2.
    fn reconcile(&mut self, trade_id: &str) -> Result<Option<DiscrepancyRecord>, DiffError> {
        let trade = self
            .pending_trades
            .remove(trade_id)
            .expect("reconcile called only for a pending trade id");

        let mut tags = Vec::new();
        let mut timestamps = Vec::new();
        let mut field_values: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();

        for (source_index, slot) in trade.slots.iter().enumerate() {
            match slot {
                None => tags.push("_missing".to_string()),
                Some(record) => {
                    let ts = record
                        .timestamp()
                        .expect("LogdirStream always sets a full timestamp");
                    timestamps.push(ts);

                    for field in &self.config.reconcile_fields {
                        let value =
                            record
                                .get(field)
                                .ok_or_else(|| DiffError::MissingReconcileField {
                                    source_index,
                                    trade_id: trade_id.to_string(),
                                    field: field.clone(),
                                })?;
                        field_values
                            .entry(field.as_str())
                            .or_default()
                            .insert(normalize(value));
                    }
                }
            }
        }

        if let (Some(min), Some(max)) = (timestamps.iter().min(), timestamps.iter().max()) {
            if *max - *min > self.config.max_skew {
                tags.push("timestamp".to_string());
            }
        }

        for field in &self.config.reconcile_fields {
            if field_values.get(field.as_str()).map(|s| s.len()).unwrap_or(0) > 1 {
                tags.push(field.clone());
            }
        }

        for (source_index, slot) in trade.slots.iter().enumerate() {
            if let Some(record) = slot {
                let ts = record.timestamp().unwrap();
                self.pending_index
                    .remove(&(ts, source_index, trade_id.to_string()));
            }
        }

        debug!(trade_id, tags = ?tags, "reconciled trade");

        if tags.is_empty() {
            Ok(None)
        } else {
            Ok(Some(DiscrepancyRecord {
                trade_id: trade_id.to_string(),
                tags,
                records: trade.slots,
            }))
        }
    }

    /// Drive the eviction pass: while the oldest pending record is older
    /// than `front_ts - extreme_skew`, force-reconcile its trade. Returns as
    /// soon as a reconciliation yields a discrepancy; a caller that wants
    /// every eviction covered should keep calling the iterator.
    fn evict(&mut self, front_ts: NaiveDateTime) -> Result<Option<DiscrepancyRecord>, DiffError> {
        let threshold = front_ts - self.config.extreme_skew;

        while let Some((ts, _source_index, trade_id)) = self.pending_index.iter().next().cloned() {
            if ts >= threshold {
                break;
            }
            if let Some(discrepancy) = self.reconcile(&trade_id)? {
                return Ok(Some(discrepancy));
            }
        }

        Ok(None)
    }

    /// Pull the globally oldest lookahead record, backfill its source, file
    /// it into the relevant pending trade, and reconcile if that completes
    /// the trade.
    fn ingest(&mut self) -> Result<Option<DiscrepancyRecord>, DiffError> {
        let (&(ts, source_index), _) = self.next_records.iter().next().unwrap();
        let record = self.next_records.remove(&(ts, source_index)).unwrap();

        if let Some(replacement) = self.sources[source_index].next().transpose()? {
            let replacement_ts = replacement
                .timestamp()
                .expect("LogdirStream always sets a full timestamp");
            self.next_records
                .insert((replacement_ts, source_index), replacement);
        }

        let trade_id = record
            .trade_id()
            .expect("LogdirStream rejects records without a trade id")
            .to_string();

        let trade = self
            .pending_trades
            .entry(trade_id.clone())
            .or_insert_with(|| PendingTrade::new(self.n()));

        if trade.slots[source_index].is_some() {
            return Err(DiffError::DuplicateTrade {
                trade_id,
                source_index,
            });
        }

        trade.slots[source_index] = Some(record);
        self.pending_index.insert((ts, source_index, trade_id.clone()));

        if self.pending_trades[&trade_id].is_complete() {
            self.reconcile(&trade_id)
        } else {
            Ok(None)
        }
    }

    fn step(&mut self) -> Result<Option<DiscrepancyRecord>, DiffError> {
        loop {
            if self.next_records.is_empty() {
                let queue = self.flush_queue.get_or_insert_with(|| {
                    self.pending_trades.keys().cloned().collect::<VecDeque<_>>()
                });

                while let Some(trade_id) = queue.pop_front() {
                    if let Some(discrepancy) = self.reconcile(&trade_id)? {
                        return Ok(Some(discrepancy));
                    }
                }
                return Ok(None);
            }

            let (&(front_ts, _), _) = self.next_records.iter().next().unwrap();

            if let Some(discrepancy) = self.evict(front_ts)? {
                return Ok(Some(discrepancy));
            }

            if let Some(discrepancy) = self.ingest()? {
                return Ok(Some(discrepancy));
            }
        }
    }
}

impl<I> Iterator for NDiffer<I>
where
    I: Iterator<Item = Result<Record, LogdirError>>,
{
    type Item = Result<DiscrepancyRecord, DiffError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(discrepancy)) => Some(Ok(discrepancy)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
