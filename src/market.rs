//! Market-context search collaborator.
//!
//! Called only for investment insights when enrichment is enabled. A failed
//! or empty search leaves the market block empty without aborting the run.

use anyhow::Result;
use async_trait::async_trait;

/// Free-text market context plus the queries that produced it
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub context: String,
    pub queries: Vec<String>,
    pub snippet_count: usize,
}

/// External search helper that turns held symbols/funds into market context.
#[async_trait]
pub trait MarketSearch: Send + Sync {
    async fn search(
        &self,
        stock_symbols: &[String],
        fund_names: &[String],
    ) -> Result<MarketSnapshot>;
}
