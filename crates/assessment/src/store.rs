//! Collaborator stores: last-known-good records and hourly history.
//!
//! The service only needs get/put by key for stale records and
//! record/recent for history, so a durable backend plugs in behind these
//! traits. The in-memory versions here back a single process.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Coordinates, HistorySample, LocationKey, Result, WeatherObservation};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The last observation successfully fetched for a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleRecord {
    pub observation: WeatherObservation,
    pub coordinates: Coordinates,
}

#[async_trait]
pub trait StaleStore: Send + Sync {
    async fn get(&self, key: &LocationKey) -> Result<Option<StaleRecord>>;
    async fn put(&self, key: &LocationKey, record: StaleRecord) -> Result<()>;
    /// Every key with a record, for background refresh.
    async fn keys(&self) -> Result<Vec<LocationKey>>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store a reading in its hour bucket, replacing an earlier reading
    /// from the same hour.
    async fn record(&self, key: &LocationKey, sample: HistorySample) -> Result<()>;
    /// Samples captured within `hours` of `now`, newest first.
    async fn recent(
        &self,
        key: &LocationKey,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistorySample>>;
}

#[derive(Debug, Default)]
pub struct MemoryStaleStore {
    records: DashMap<LocationKey, StaleRecord>,
}

impl MemoryStaleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StaleStore for MemoryStaleStore {
    async fn get(&self, key: &LocationKey) -> Result<Option<StaleRecord>> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn put(&self, key: &LocationKey, record: StaleRecord) -> Result<()> {
        self.records.insert(key.clone(), record);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<LocationKey>> {
        let mut keys: Vec<LocationKey> = self.records.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

/// Hour-bucketed history, pruned to `retention_hours` on every write.
#[derive(Debug)]
pub struct MemoryHistoryStore {
    buckets: DashMap<LocationKey, BTreeMap<String, HistorySample>>,
    retention_hours: u32,
}

impl MemoryHistoryStore {
    pub fn new(retention_hours: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            retention_hours,
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record(&self, key: &LocationKey, sample: HistorySample) -> Result<()> {
        let cutoff = sample.captured_at - Duration::hours(i64::from(self.retention_hours));
        let mut hours = self.buckets.entry(key.clone()).or_default();
        hours.insert(sample.hour_id.clone(), sample);
        hours.retain(|_, s| s.captured_at >= cutoff);
        Ok(())
    }

    async fn recent(
        &self,
        key: &LocationKey,
        hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistorySample>> {
        let cutoff = now - Duration::hours(i64::from(hours));
        let Some(bucket) = self.buckets.get(key) else {
            return Ok(Vec::new());
        };
        // Hour ids sort chronologically, so reverse order is newest first.
        Ok(bucket
            .values()
            .rev()
            .filter(|s| s.captured_at >= cutoff && s.captured_at <= now)
            .cloned()
            .collect())
    }
}
