//! Cache and retention management for analysis records.
//!
//! The persisted record set for a (user, insight type) pair is the cache:
//! the most recent record is "current", staleness is derived from its age,
//! and history is pruned to a fixed bound after every write. Retention runs
//! as a post-hoc sweep, so a single run leaves the store bounded regardless
//! of what state it started in.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{AnalysisFilter, AnalysisStore};
use crate::types::{
    AnalysisRecord, InsightSection, InsightType, SearchContext, StructuredData,
    MAX_ANALYSES_PER_TYPE,
};

/// A cached record with its derived staleness
#[derive(Debug, Clone)]
pub struct CachedAnalysis {
    pub record: AnalysisRecord,
    pub stale: bool,
}

/// Payload for persisting one completed generation
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub user_id: String,
    pub insight_type: InsightType,
    pub content: String,
    pub sections: Option<Vec<InsightSection>>,
    pub structured_data: Option<StructuredData>,
    pub data_points: u32,
    pub search_context: Option<SearchContext>,
}

/// Cache and retention manager over the analysis store.
pub struct CacheManager {
    store: Arc<dyn AnalysisStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store }
    }

    /// The most recent record for (user, type) with its staleness at `now`.
    pub async fn latest(
        &self,
        user_id: &str,
        insight_type: InsightType,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedAnalysis>, StoreError> {
        let filter = AnalysisFilter::new(user_id, insight_type);
        let record = self.store.find_one(&filter).await?;
        Ok(record.map(|record| {
            let stale = record.is_stale(now);
            CachedAnalysis { record, stale }
        }))
    }

    /// Insert a new record, then sweep history for the pair down to
    /// [`MAX_ANALYSES_PER_TYPE`], deleting the oldest records first.
    ///
    /// The insert is not rolled back if the sweep fails; keeping the new
    /// record wins over exact bound adherence.
    pub async fn persist(
        &self,
        analysis: NewAnalysis,
        now: DateTime<Utc>,
    ) -> Result<AnalysisRecord, StoreError> {
        let record = AnalysisRecord {
            id: Uuid::new_v4().to_string(),
            user_id: analysis.user_id,
            insight_type: analysis.insight_type,
            content: analysis.content,
            sections: analysis.sections,
            structured_data: analysis.structured_data,
            generated_at: now,
            data_points: analysis.data_points,
            search_context: analysis.search_context,
            created_at: now,
        };

        self.store.insert_one(record.clone()).await?;

        let filter = AnalysisFilter::new(&record.user_id, record.insight_type);
        let all = self.store.find(&filter).await?;
        if all.len() > MAX_ANALYSES_PER_TYPE {
            let excess: Vec<String> = all
                .iter()
                .skip(MAX_ANALYSES_PER_TYPE)
                .map(|r| r.id.clone())
                .collect();
            let removed = self.store.delete_many(&excess).await?;
            log::info!(
                "pruned {} old {} analyses for user {}",
                removed,
                record.insight_type,
                record.user_id
            );
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAnalysisStore;
    use chrono::Duration;

    fn new_analysis(user: &str) -> NewAnalysis {
        NewAnalysis {
            user_id: user.to_string(),
            insight_type: InsightType::SpendingAnalysis,
            content: "analysis".to_string(),
            sections: None,
            structured_data: None,
            data_points: 12,
            search_context: None,
        }
    }

    #[tokio::test]
    async fn test_latest_derives_staleness() {
        let store = Arc::new(MemoryAnalysisStore::new());
        let cache = CacheManager::new(store);
        let now = Utc::now();

        cache.persist(new_analysis("u-1"), now - Duration::hours(1)).await.unwrap();

        let hit = cache
            .latest("u-1", InsightType::SpendingAnalysis, now)
            .await
            .unwrap()
            .unwrap();
        assert!(!hit.stale);

        let later = now + Duration::hours(24);
        let hit = cache
            .latest("u-1", InsightType::SpendingAnalysis, later)
            .await
            .unwrap()
            .unwrap();
        assert!(hit.stale);
    }

    #[tokio::test]
    async fn test_latest_is_none_without_records() {
        let store = Arc::new(MemoryAnalysisStore::new());
        let cache = CacheManager::new(store);
        let hit = cache
            .latest("u-1", InsightType::SpendingAnalysis, Utc::now())
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_persist_sweeps_even_an_over_bound_history() {
        let store = Arc::new(MemoryAnalysisStore::new());
        let cache = CacheManager::new(Arc::clone(&store) as Arc<dyn AnalysisStore>);
        let base = Utc::now() - Duration::hours(100);

        // Six records already in the store (more than the bound allows)
        for i in 0..6 {
            let at = base + Duration::hours(i);
            store
                .insert_one(AnalysisRecord {
                    id: format!("pre-{}", i),
                    user_id: "u-1".to_string(),
                    insight_type: InsightType::SpendingAnalysis,
                    content: "old".to_string(),
                    sections: None,
                    structured_data: None,
                    generated_at: at,
                    data_points: 1,
                    search_context: None,
                    created_at: at,
                })
                .await
                .unwrap();
        }

        // One successful generation sweeps the history back to the bound
        cache.persist(new_analysis("u-1"), base + Duration::hours(6)).await.unwrap();

        let filter = AnalysisFilter::new("u-1", InsightType::SpendingAnalysis);
        let remaining = store.find(&filter).await.unwrap();
        assert_eq!(remaining.len(), MAX_ANALYSES_PER_TYPE);

        // Newest kept, the two oldest gone
        assert_eq!(remaining[0].generated_at, base + Duration::hours(6));
        assert!(remaining.iter().all(|r| r.id != "pre-0" && r.id != "pre-1"));
    }

    #[tokio::test]
    async fn test_pruning_is_scoped_to_the_pair() {
        let store = Arc::new(MemoryAnalysisStore::new());
        let cache = CacheManager::new(Arc::clone(&store) as Arc<dyn AnalysisStore>);
        let base = Utc::now() - Duration::hours(100);

        for i in 0..6 {
            cache
                .persist(new_analysis("u-1"), base + Duration::hours(i))
                .await
                .unwrap();
        }
        // A different user is untouched by u-1's sweep
        cache.persist(new_analysis("u-2"), base).await.unwrap();

        assert_eq!(store.len(), MAX_ANALYSES_PER_TYPE + 1);
    }
}
