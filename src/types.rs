//! Core type definitions for the insight pipeline.
//!
//! This module contains the types shared across the pipeline: the insight
//! type enumeration, the per-run context, the structured-data union parsed
//! from generator output, normalized display sections, and the persisted
//! analysis record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Maximum number of historical analyses kept per (user, insight type)
pub const MAX_ANALYSES_PER_TYPE: usize = 5;

/// Hours after which a cached analysis counts as stale
pub const STALE_AFTER_HOURS: i64 = 24;

/// Request timeout in seconds for generation providers
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Maximum tokens for insight generation (longer response needed)
pub const MAX_TOKENS_INSIGHTS: u32 = 2000;

// ============================================================================
// Insight Types
// ============================================================================

/// The six categories of financial analysis the pipeline can produce.
///
/// The type determines which system prompt is used, which context blocks are
/// populated, and which structured schema the generator is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    SpendingAnalysis,
    MonthlyBudget,
    WeeklyBudget,
    InvestmentInsights,
    TaxOptimization,
    PlannerRecommendation,
}

impl InsightType {
    pub const ALL: [InsightType; 6] = [
        InsightType::SpendingAnalysis,
        InsightType::MonthlyBudget,
        InsightType::WeeklyBudget,
        InsightType::InvestmentInsights,
        InsightType::TaxOptimization,
        InsightType::PlannerRecommendation,
    ];

    /// Stable string key, also used to filter persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::SpendingAnalysis => "spending_analysis",
            InsightType::MonthlyBudget => "monthly_budget",
            InsightType::WeeklyBudget => "weekly_budget",
            InsightType::InvestmentInsights => "investment_insights",
            InsightType::TaxOptimization => "tax_optimization",
            InsightType::PlannerRecommendation => "planner_recommendation",
        }
    }

    /// Whether a run of this type is pointless without transaction history.
    ///
    /// Investment, tax and planner insights are driven by holdings, the tax
    /// profile and the financial plan respectively, so they proceed even for
    /// a user with zero transactions.
    pub fn requires_transactions(&self) -> bool {
        !matches!(
            self,
            InsightType::InvestmentInsights
                | InsightType::TaxOptimization
                | InsightType::PlannerRecommendation
        )
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InsightType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown insight type: {}", s))
    }
}

// ============================================================================
// Pipeline Context
// ============================================================================

/// Named text blocks assembled per run and fed to the prompt builder.
///
/// Built fresh for every run, owned by that run, never persisted. Blocks
/// irrelevant to the requested insight type stay empty and are skipped by
/// the prompt builder.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub financial_context: String,
    pub current_month_context: String,
    pub investment_context: String,
    pub nwi_context: String,
    pub health_context: String,
    pub goals_context: String,
    pub market_context: String,
    pub tax_context: String,
    pub planner_context: String,

    pub transaction_count: usize,

    /// Stock symbols held by the user, for market-context enrichment only
    pub stock_symbols: Vec<String>,
    /// Mutual fund names held by the user, for market-context enrichment only
    pub fund_names: Vec<String>,
}

// ============================================================================
// Insight Sections
// ============================================================================

/// Rendering style of a normalized section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    List,
    NumberedList,
    Highlight,
}

impl SectionKind {
    pub fn parse(s: &str) -> Option<SectionKind> {
        match s {
            "summary" => Some(SectionKind::Summary),
            "list" => Some(SectionKind::List),
            "numbered_list" => Some(SectionKind::NumberedList),
            "highlight" => Some(SectionKind::Highlight),
            _ => None,
        }
    }
}

/// Severity attached to a section for display emphasis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Positive,
    Warning,
    Critical,
    Neutral,
}

impl Severity {
    /// Values outside the fixed enum drop to `None`.
    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "positive" => Some(Severity::Positive),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            "neutral" => Some(Severity::Neutral),
            _ => None,
        }
    }
}

/// Normalized, renderer-agnostic display unit derived from structured data.
///
/// Exactly one of `text` / `items` / `highlight` is populated, matching
/// `kind`. Sections are derived deterministically by the schema dispatcher
/// and never hand-authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightSection {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: SectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl InsightSection {
    pub fn summary(id: &str, title: &str, text: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind: SectionKind::Summary,
            text: Some(text.into()),
            items: None,
            highlight: None,
            severity: None,
        }
    }

    pub fn list(id: &str, title: &str, items: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind: SectionKind::List,
            text: None,
            items: Some(items),
            highlight: None,
            severity: None,
        }
    }

    pub fn numbered_list(id: &str, title: &str, items: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind: SectionKind::NumberedList,
            text: None,
            items: Some(items),
            highlight: None,
            severity: None,
        }
    }

    pub fn highlight(id: &str, title: &str, highlight: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind: SectionKind::Highlight,
            text: None,
            items: None,
            highlight: Some(highlight.into()),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

// ============================================================================
// Structured Data (generator output schemas)
// ============================================================================

/// Spend in one category as reported by the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpend {
    pub category: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub percent: Option<f64>,
}

/// Income/expense/savings roll-up inside a spending analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSummary {
    #[serde(default)]
    pub total_income: f64,
    #[serde(default)]
    pub total_expenses: f64,
    #[serde(default)]
    pub savings_rate: f64,
}

/// Spending analysis result. Characteristic fields: `healthScore`,
/// `topCategories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingAnalysis {
    pub health_score: f64,
    pub top_categories: Vec<CategorySpend>,
    #[serde(default)]
    pub summary: Option<SpendingSummary>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub alerts: Vec<String>,
    #[serde(default)]
    pub key_insight: Option<String>,
}

/// One band of a needs/wants/savings split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationBand {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Monthly budget result. Characteristic fields: `needs`, `wants`,
/// `savingsInvestments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBudget {
    pub needs: AllocationBand,
    pub wants: AllocationBand,
    pub savings_investments: AllocationBand,
    #[serde(default)]
    pub total_budget: Option<f64>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Weekly budget result. Characteristic fields: `weeklyTarget`, `dailyLimit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBudget {
    pub weekly_target: f64,
    pub daily_limit: f64,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Diversification review inside an investment insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diversification {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
}

/// Investment insights result. Characteristic fields: `portfolioValue`,
/// `diversification`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentInsights {
    pub portfolio_value: f64,
    pub diversification: Diversification,
    #[serde(default)]
    pub performance: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub market_outlook: Option<String>,
}

/// Tax tips result. Characteristic fields: `tips`, `regime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTips {
    pub regime: String,
    pub tips: Vec<String>,
    #[serde(default)]
    pub potential_savings: Option<f64>,
    #[serde(default)]
    pub regime_suggestion: Option<String>,
    #[serde(default)]
    pub unused_deductions: Vec<String>,
}

/// Planner recommendation result. Characteristic fields: `planScore`,
/// `allocationReview`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerRecommendation {
    pub plan_score: f64,
    pub allocation_review: String,
    #[serde(default)]
    pub adjustments: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// The generator's parsed JSON payload, one of six known shapes.
///
/// The generator never labels its own output; classification happens
/// post-hoc by field presence (see the schema dispatcher). Serialization is
/// untagged so persisted data keeps the generator's own wire shape; the
/// variant order matches classification priority so round-trips stay
/// consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredData {
    TaxTips(TaxTips),
    SpendingAnalysis(SpendingAnalysis),
    MonthlyBudget(MonthlyBudget),
    WeeklyBudget(WeeklyBudget),
    InvestmentInsights(InvestmentInsights),
    PlannerRecommendation(PlannerRecommendation),
}

// ============================================================================
// Analysis Records
// ============================================================================

/// Queries issued during market-context enrichment, kept for transparency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    pub queries: Vec<String>,
    pub snippet_count: usize,
}

/// The persisted unit: one completed analysis for a (user, insight type).
///
/// Immutable after creation; removed only by the retention sweep. Multiple
/// records per pair exist at once, ordered by `generated_at`; the most
/// recent is "current". Staleness is derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub user_id: String,
    pub insight_type: InsightType,
    /// Markdown body; either the generator's raw text or a deterministic
    /// rendering of `sections`
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<InsightSection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<StructuredData>,
    pub generated_at: DateTime<Utc>,
    /// Number of upstream data points (transactions) behind this analysis
    pub data_points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_context: Option<SearchContext>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Derived staleness: older than [`STALE_AFTER_HOURS`].
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.generated_at > Duration::hours(STALE_AFTER_HOURS)
    }
}

// ============================================================================
// Pipeline Result
// ============================================================================

/// What a pipeline run hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<InsightSection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<StructuredData>,
    pub generated_at: DateTime<Utc>,
    pub data_points: u32,
    pub from_cache: bool,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_context: Option<SearchContext>,
}

impl PipelineResult {
    pub fn from_record(record: AnalysisRecord, from_cache: bool, stale: bool) -> Self {
        Self {
            content: record.content,
            sections: record.sections,
            structured_data: record.structured_data,
            generated_at: record.generated_at,
            data_points: record.data_points,
            from_cache,
            stale,
            search_context: record.search_context,
        }
    }
}
