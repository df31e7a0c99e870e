//! Analysis-record persistence interface.
//!
//! The pipeline persists and prunes [`AnalysisRecord`]s through this trait;
//! the backing store is a collaborator (document database, SQL table,
//! whatever the host application uses). No transactions are assumed.
//!
//! [`MemoryAnalysisStore`] is a reference implementation over a `Mutex`ed
//! vector, enough for tests and database-free embedding.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{AnalysisRecord, InsightType};

/// Filter for analysis-record queries: one (user, insight type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFilter {
    pub user_id: String,
    pub insight_type: InsightType,
}

impl AnalysisFilter {
    pub fn new(user_id: &str, insight_type: InsightType) -> Self {
        Self {
            user_id: user_id.to_string(),
            insight_type,
        }
    }

    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        record.user_id == self.user_id && record.insight_type == self.insight_type
    }
}

/// Persistent store for analysis records.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// All records matching the filter, sorted by `generated_at` descending.
    async fn find(&self, filter: &AnalysisFilter) -> Result<Vec<AnalysisRecord>, StoreError>;

    /// The most recent record matching the filter.
    async fn find_one(&self, filter: &AnalysisFilter) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Insert a new record, returning its id.
    async fn insert_one(&self, record: AnalysisRecord) -> Result<String, StoreError>;

    /// Delete the records with the given ids, returning how many were removed.
    async fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError>;
}

/// In-memory analysis store.
#[derive(Default)]
pub struct MemoryAnalysisStore {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total record count across all users and types
    pub fn len(&self) -> usize {
        self.records.lock().expect("analysis store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn find(&self, filter: &AnalysisFilter) -> Result<Vec<AnalysisRecord>, StoreError> {
        let records = self.records.lock().expect("analysis store lock poisoned");
        let mut matching: Vec<AnalysisRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(matching)
    }

    async fn insert_one(&self, record: AnalysisRecord) -> Result<String, StoreError> {
        let id = record.id.clone();
        let mut records = self.records.lock().expect("analysis store lock poisoned");
        records.push(record);
        Ok(id)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut records = self.records.lock().expect("analysis store lock poisoned");
        let before = records.len();
        records.retain(|r| !ids.contains(&r.id));
        Ok(before - records.len())
    }
}
