//! Batch counters.
//!
//! A [`BatchStats`] handle is created per run and shared by `Arc` with
//! everything that counts. All counters only ever grow.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Counters for one output table.
#[derive(Debug, Default)]
pub struct TableStats {
    rows: AtomicU64,
    documents: AtomicU64,
}

impl TableStats {
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    pub fn documents(&self) -> u64 {
        self.documents.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct BatchStats {
    documents: AtomicU64,
    bytes: AtomicU64,
    broken: AtomicU64,
    failed: AtomicU64,
    parse_nanos: AtomicU64,
    tables: RwLock<BTreeMap<String, Arc<TableStats>>>,
}

impl BatchStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_document(&self, bytes: u64) {
        self.documents.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_broken(&self) {
        self.broken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_parse_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.parse_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Counters for `table`, created on first use.
    pub fn table(&self, table: &str) -> Arc<TableStats> {
        if let Some(existing) = self
            .tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(table)
        {
            return existing.clone();
        }
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    pub fn add_rows(&self, table: &str, rows: u64) {
        let stats = self.table(table);
        stats.rows.fetch_add(rows, Ordering::Relaxed);
        stats.documents.fetch_add(1, Ordering::Relaxed);
    }

    pub fn documents(&self) -> u64 {
        self.documents.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn broken(&self) -> u64 {
        self.broken.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn parse_time(&self) -> Duration {
        Duration::from_nanos(self.parse_nanos.load(Ordering::Relaxed))
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, t)| {
                (
                    name.clone(),
                    TableSnapshot {
                        rows: t.rows(),
                        documents: t.documents(),
                    },
                )
            })
            .collect();
        StatsSnapshot {
            documents: self.documents(),
            bytes: self.bytes(),
            broken: self.broken(),
            failed: self.failed(),
            parse_millis: self.parse_time().as_millis() as u64,
            tables,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub rows: u64,
    pub documents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub documents: u64,
    pub bytes: u64,
    pub broken: u64,
    pub failed: u64,
    pub parse_millis: u64,
    pub tables: BTreeMap<String, TableSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_across_threads() {
        let stats = BatchStats::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.add_document(10);
                        stats.add_rows("orders", 3);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.documents, 400);
        assert_eq!(snap.bytes, 4000);
        assert_eq!(snap.tables["orders"].rows, 1200);
        assert_eq!(snap.tables["orders"].documents, 400);
    }

    #[test]
    fn test_parse_time_and_failures() {
        let stats = BatchStats::new();
        stats.add_parse_time(Duration::from_millis(3));
        stats.add_parse_time(Duration::from_millis(4));
        stats.add_broken();
        stats.add_failed();
        stats.add_failed();
        assert_eq!(stats.parse_time(), Duration::from_millis(7));
        assert_eq!(stats.broken(), 1);
        assert_eq!(stats.failed(), 2);
    }
}
