//! Pipeline orchestration.
//!
//! One run is a linear sequence of awaited steps:
//! cache check → collect → (investment only) market enrichment → prompt →
//! generate → parse/normalize → persist → return. Collection and generation
//! failures abort the run with nothing persisted; parse failures degrade to
//! unstructured content. There is no cross-invocation locking: two
//! concurrent regenerations for the same (user, type) can both generate and
//! both persist.

use std::sync::Arc;

use chrono::Utc;

use crate::cache::{CacheManager, NewAnalysis};
use crate::context;
use crate::error::PipelineError;
use crate::finance::FinanceStore;
use crate::generate::{GenerationOptions, TextGenerator};
use crate::market::MarketSearch;
use crate::prompts;
use crate::sections;
use crate::store::AnalysisStore;
use crate::types::{InsightType, PipelineResult, SearchContext, MAX_TOKENS_INSIGHTS};

/// Per-run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip the cache check and always generate
    pub force: bool,
    /// Merge market context into investment insights
    pub market_enrichment: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            market_enrichment: true,
        }
    }
}

/// The insight generation pipeline.
pub struct InsightPipeline {
    finance: Arc<dyn FinanceStore>,
    cache: CacheManager,
    generator: Arc<dyn TextGenerator>,
    market: Option<Arc<dyn MarketSearch>>,
}

impl InsightPipeline {
    pub fn new(
        finance: Arc<dyn FinanceStore>,
        analyses: Arc<dyn AnalysisStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            finance,
            cache: CacheManager::new(analyses),
            generator,
            market: None,
        }
    }

    /// Attach a market-context search helper for investment insights.
    pub fn with_market_search(mut self, market: Arc<dyn MarketSearch>) -> Self {
        self.market = Some(market);
        self
    }

    /// The most recent persisted analysis for display, with its derived
    /// staleness. Never triggers generation.
    pub async fn cached(
        &self,
        user_id: &str,
        insight_type: InsightType,
    ) -> Result<Option<PipelineResult>, PipelineError> {
        let hit = self.cache.latest(user_id, insight_type, Utc::now()).await?;
        Ok(hit.map(|hit| PipelineResult::from_record(hit.record, true, hit.stale)))
    }

    /// Run the pipeline for one (user, insight type).
    ///
    /// Returns the cached record when it is fresh and `force` is off;
    /// otherwise collects context, calls the generator, normalizes the
    /// response and persists a new record.
    pub async fn run(
        &self,
        user_id: &str,
        insight_type: InsightType,
        options: RunOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let now = Utc::now();

        if !options.force {
            if let Some(hit) = self.cache.latest(user_id, insight_type, now).await? {
                if !hit.stale {
                    log::info!(
                        "returning cached {} analysis for user {}",
                        insight_type,
                        user_id
                    );
                    return Ok(PipelineResult::from_record(hit.record, true, false));
                }
            }
        }

        let mut ctx = context::collect(self.finance.as_ref(), user_id, insight_type, now).await?;

        let mut search_context: Option<SearchContext> = None;
        if insight_type == InsightType::InvestmentInsights && options.market_enrichment {
            if let Some(market) = &self.market {
                match market.search(&ctx.stock_symbols, &ctx.fund_names).await {
                    Ok(snapshot) if !snapshot.context.trim().is_empty() => {
                        search_context = Some(SearchContext {
                            queries: snapshot.queries,
                            snippet_count: snapshot.snippet_count,
                        });
                        ctx.market_context = snapshot.context;
                    }
                    Ok(_) => {
                        log::warn!("market search returned no context; continuing without it")
                    }
                    Err(e) => {
                        log::warn!("market search failed: {}; continuing without it", e)
                    }
                }
            }
        }

        let messages = prompts::build_messages(insight_type, &ctx);
        let raw = self
            .generator
            .complete(
                &messages,
                &GenerationOptions {
                    max_tokens: MAX_TOKENS_INSIGHTS,
                },
            )
            .await?;

        let normalized = sections::normalize_response(&raw);

        let record = self
            .cache
            .persist(
                NewAnalysis {
                    user_id: user_id.to_string(),
                    insight_type,
                    content: normalized.content,
                    sections: normalized.sections,
                    structured_data: normalized.structured_data,
                    data_points: ctx.transaction_count as u32,
                    search_context,
                },
                now,
            )
            .await?;

        Ok(PipelineResult::from_record(record, false, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::finance::{MemoryFinanceStore, StockHolding, Transaction, TxnDirection};
    use crate::generate::GenMessage;
    use crate::market::MarketSnapshot;
    use crate::store::{AnalysisFilter, MemoryAnalysisStore};
    use crate::types::StructuredData;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator returning a fixed response and counting calls
    struct FixedGenerator {
        response: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedGenerator {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                response: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn complete(
            &self,
            _messages: &[GenMessage],
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GenerationError::server_error("test", "test-model", "HTTP 500"))
            } else {
                Ok(self.response.clone())
            }
        }
    }

    struct FixedMarketSearch;

    #[async_trait]
    impl MarketSearch for FixedMarketSearch {
        async fn search(
            &self,
            stock_symbols: &[String],
            _fund_names: &[String],
        ) -> anyhow::Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                context: format!("Latest news for {}", stock_symbols.join(", ")),
                queries: vec![format!("{} stock news", stock_symbols.join(" "))],
                snippet_count: 3,
            })
        }
    }

    fn transactions() -> Vec<Transaction> {
        vec![
            Transaction {
                id: "t1".to_string(),
                user_id: "u-1".to_string(),
                date: "2026-08-01".parse().unwrap(),
                amount: 50000.0,
                category: "Salary".to_string(),
                description: None,
                direction: TxnDirection::Income,
                recurring: true,
            },
            Transaction {
                id: "t2".to_string(),
                user_id: "u-1".to_string(),
                date: "2026-08-03".parse().unwrap(),
                amount: 4500.0,
                category: "Food".to_string(),
                description: None,
                direction: TxnDirection::Expense,
                recurring: false,
            },
        ]
    }

    fn spending_response() -> String {
        serde_json::json!({
            "healthScore": 82,
            "topCategories": [{"category": "Food", "amount": 4500.0, "percent": 100.0}],
            "actionItems": ["Keep it up"],
            "keyInsight": "Savings rate is strong"
        })
        .to_string()
    }

    fn pipeline_with(
        finance: MemoryFinanceStore,
        generator: Arc<FixedGenerator>,
    ) -> (InsightPipeline, Arc<MemoryAnalysisStore>) {
        let analyses = Arc::new(MemoryAnalysisStore::new());
        let pipeline = InsightPipeline::new(
            Arc::new(finance),
            Arc::clone(&analyses) as Arc<dyn AnalysisStore>,
            generator as Arc<dyn TextGenerator>,
        );
        (pipeline, analyses)
    }

    #[tokio::test]
    async fn test_full_run_generates_normalizes_and_persists() {
        let generator = Arc::new(FixedGenerator::new(&spending_response()));
        let (pipeline, analyses) =
            pipeline_with(MemoryFinanceStore::new().with_transactions(transactions()), Arc::clone(&generator));

        let result = pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap();

        assert!(!result.from_cache);
        assert!(!result.stale);
        assert_eq!(result.data_points, 2);
        assert!(matches!(
            result.structured_data,
            Some(StructuredData::SpendingAnalysis(_))
        ));
        let sections = result.sections.unwrap();
        assert_eq!(sections[0].id, "overview");
        assert!(result.content.starts_with("## Overview"));

        let stored = analyses
            .find(&AnalysisFilter::new("u-1", InsightType::SpendingAnalysis))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_short_circuits_generation() {
        let generator = Arc::new(FixedGenerator::new(&spending_response()));
        let (pipeline, analyses) =
            pipeline_with(MemoryFinanceStore::new().with_transactions(transactions()), Arc::clone(&generator));

        pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(generator.call_count(), 1);

        let second = pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap();
        assert!(second.from_cache);
        assert!(!second.stale);
        // No second generation, no second record
        assert_eq!(generator.call_count(), 1);
        assert_eq!(analyses.len(), 1);
    }

    #[tokio::test]
    async fn test_force_bypasses_a_fresh_cache() {
        let generator = Arc::new(FixedGenerator::new(&spending_response()));
        let (pipeline, analyses) =
            pipeline_with(MemoryFinanceStore::new().with_transactions(transactions()), Arc::clone(&generator));

        pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap();
        let forced = pipeline
            .run(
                "u-1",
                InsightType::SpendingAnalysis,
                RunOptions {
                    force: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!forced.from_cache);
        assert_eq!(generator.call_count(), 2);
        assert_eq!(analyses.len(), 2);
    }

    #[tokio::test]
    async fn test_no_data_aborts_before_generation() {
        let generator = Arc::new(FixedGenerator::new(&spending_response()));
        let (pipeline, analyses) = pipeline_with(MemoryFinanceStore::new(), Arc::clone(&generator));

        let err = pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));
        assert_eq!(generator.call_count(), 0);
        assert!(analyses.is_empty());
    }

    #[tokio::test]
    async fn test_investment_run_is_not_gated_by_transactions() {
        let generator = Arc::new(FixedGenerator::new(
            &serde_json::json!({
                "portfolioValue": 16500.0,
                "diversification": {"score": 35, "gaps": ["No debt exposure"]}
            })
            .to_string(),
        ));
        let finance = MemoryFinanceStore::new().with_stocks(vec![StockHolding {
            symbol: "INFY".to_string(),
            name: "Infosys".to_string(),
            quantity: 10.0,
            invested: 14000.0,
            current_value: 16500.0,
        }]);
        let (pipeline, _) = pipeline_with(finance, Arc::clone(&generator));

        let result = pipeline
            .run("u-1", InsightType::InvestmentInsights, RunOptions::default())
            .await
            .unwrap();
        assert!(matches!(
            result.structured_data,
            Some(StructuredData::InvestmentInsights(_))
        ));
        assert_eq!(result.data_points, 0);
    }

    #[tokio::test]
    async fn test_market_enrichment_records_search_context() {
        let generator = Arc::new(FixedGenerator::new(
            &serde_json::json!({
                "portfolioValue": 16500.0,
                "diversification": {"summary": "Concentrated"}
            })
            .to_string(),
        ));
        let finance = MemoryFinanceStore::new().with_stocks(vec![StockHolding {
            symbol: "INFY".to_string(),
            name: "Infosys".to_string(),
            quantity: 10.0,
            invested: 14000.0,
            current_value: 16500.0,
        }]);
        let analyses = Arc::new(MemoryAnalysisStore::new());
        let pipeline = InsightPipeline::new(
            Arc::new(finance),
            Arc::clone(&analyses) as Arc<dyn AnalysisStore>,
            Arc::clone(&generator) as Arc<dyn TextGenerator>,
        )
        .with_market_search(Arc::new(FixedMarketSearch));

        let result = pipeline
            .run("u-1", InsightType::InvestmentInsights, RunOptions::default())
            .await
            .unwrap();

        let search = result.search_context.unwrap();
        assert_eq!(search.snippet_count, 3);
        assert_eq!(search.queries, vec!["INFY stock news".to_string()]);

        // The persisted record carries the same search context
        let stored = analyses
            .find(&AnalysisFilter::new("u-1", InsightType::InvestmentInsights))
            .await
            .unwrap();
        assert!(stored[0].search_context.is_some());
    }

    #[tokio::test]
    async fn test_generation_failure_persists_nothing() {
        let generator = Arc::new(FixedGenerator::failing());
        let (pipeline, analyses) =
            pipeline_with(MemoryFinanceStore::new().with_transactions(transactions()), Arc::clone(&generator));

        let err = pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert!(analyses.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_response_degrades_to_raw_content() {
        let raw = "Spend less on food, save more. No JSON today.";
        let generator = Arc::new(FixedGenerator::new(raw));
        let (pipeline, _) =
            pipeline_with(MemoryFinanceStore::new().with_transactions(transactions()), Arc::clone(&generator));

        let result = pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content, raw);
        assert!(result.sections.is_none());
        assert!(result.structured_data.is_none());
    }

    #[tokio::test]
    async fn test_cached_reports_staleness_without_generating() {
        let generator = Arc::new(FixedGenerator::new(&spending_response()));
        let (pipeline, _) =
            pipeline_with(MemoryFinanceStore::new().with_transactions(transactions()), Arc::clone(&generator));

        assert!(pipeline
            .cached("u-1", InsightType::SpendingAnalysis)
            .await
            .unwrap()
            .is_none());

        pipeline
            .run("u-1", InsightType::SpendingAnalysis, RunOptions::default())
            .await
            .unwrap();
        let cached = pipeline
            .cached("u-1", InsightType::SpendingAnalysis)
            .await
            .unwrap()
            .unwrap();
        assert!(cached.from_cache);
        assert!(!cached.stale);
        assert_eq!(generator.call_count(), 1);
    }
}
