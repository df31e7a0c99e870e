//! Financial record types and the read-side store interface.
//!
//! These are the upstream records the context collector summarizes:
//! transactions, budgets, holdings, systematic investment plans, goals, the
//! needs/wants/investments split, the tax profile, and the financial plan.
//! The pipeline only ever reads them; writing and repairing financial data
//! happens upstream.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ============================================================================
// Records
// ============================================================================

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnDirection {
    Income,
    Expense,
}

/// A single financial transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub direction: TxnDirection,
    /// Recurring payments (rent, subscriptions, SIP debits)
    #[serde(default)]
    pub recurring: bool,
}

/// A per-category monthly spending limit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub category: String,
    pub monthly_limit: f64,
}

/// A stock position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockHolding {
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub invested: f64,
    pub current_value: f64,
}

/// A mutual fund position
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualFund {
    pub name: String,
    pub invested: f64,
    pub current_value: f64,
}

/// A systematic investment plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sip {
    pub fund_name: String,
    pub monthly_amount: f64,
    #[serde(default)]
    pub active: bool,
}

/// A savings goal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub name: String,
    pub target_amount: f64,
    pub saved_amount: f64,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}

/// Needs/wants/investments budgeting split
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NwiConfig {
    pub needs_percent: f64,
    pub wants_percent: f64,
    pub investments_percent: f64,
    #[serde(default)]
    pub monthly_income: Option<f64>,
}

/// A declared tax deduction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deduction {
    /// Section code, e.g. "80C"
    pub code: String,
    pub amount: f64,
}

/// The user's tax configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxProfile {
    /// "old" or "new"
    pub regime: String,
    pub annual_income: f64,
    #[serde(default)]
    pub deductions: Vec<Deduction>,
}

/// A saved financial plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialPlan {
    pub name: String,
    pub monthly_investment: f64,
    pub equity_percent: f64,
    pub debt_percent: f64,
    pub cash_percent: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

// ============================================================================
// Read Store
// ============================================================================

/// Read-only access to a user's financial records.
///
/// Queries for unrelated collections are independent; the context collector
/// issues them concurrently and joins before proceeding.
#[async_trait]
pub trait FinanceStore: Send + Sync {
    async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, StoreError>;
    async fn budgets(&self, user_id: &str) -> Result<Vec<Budget>, StoreError>;
    async fn stock_holdings(&self, user_id: &str) -> Result<Vec<StockHolding>, StoreError>;
    async fn mutual_funds(&self, user_id: &str) -> Result<Vec<MutualFund>, StoreError>;
    async fn sips(&self, user_id: &str) -> Result<Vec<Sip>, StoreError>;
    async fn goals(&self, user_id: &str) -> Result<Vec<Goal>, StoreError>;
    async fn nwi_config(&self, user_id: &str) -> Result<Option<NwiConfig>, StoreError>;
    async fn tax_profile(&self, user_id: &str) -> Result<Option<TaxProfile>, StoreError>;
    async fn financial_plan(&self, user_id: &str) -> Result<Option<FinancialPlan>, StoreError>;
}

/// In-memory finance store holding fixed record sets.
///
/// All queries return the stored data regardless of `user_id`; it exists for
/// tests and single-user embedding, not multi-tenant serving.
#[derive(Default)]
pub struct MemoryFinanceStore {
    inner: Mutex<MemoryFinanceData>,
}

#[derive(Default, Clone)]
struct MemoryFinanceData {
    transactions: Vec<Transaction>,
    budgets: Vec<Budget>,
    stocks: Vec<StockHolding>,
    funds: Vec<MutualFund>,
    sips: Vec<Sip>,
    goals: Vec<Goal>,
    nwi: Option<NwiConfig>,
    tax: Option<TaxProfile>,
    plan: Option<FinancialPlan>,
}

impl MemoryFinanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(self, transactions: Vec<Transaction>) -> Self {
        self.inner.lock().expect("finance store lock poisoned").transactions = transactions;
        self
    }

    pub fn with_budgets(self, budgets: Vec<Budget>) -> Self {
        self.inner.lock().expect("finance store lock poisoned").budgets = budgets;
        self
    }

    pub fn with_stocks(self, stocks: Vec<StockHolding>) -> Self {
        self.inner.lock().expect("finance store lock poisoned").stocks = stocks;
        self
    }

    pub fn with_funds(self, funds: Vec<MutualFund>) -> Self {
        self.inner.lock().expect("finance store lock poisoned").funds = funds;
        self
    }

    pub fn with_sips(self, sips: Vec<Sip>) -> Self {
        self.inner.lock().expect("finance store lock poisoned").sips = sips;
        self
    }

    pub fn with_goals(self, goals: Vec<Goal>) -> Self {
        self.inner.lock().expect("finance store lock poisoned").goals = goals;
        self
    }

    pub fn with_nwi_config(self, nwi: NwiConfig) -> Self {
        self.inner.lock().expect("finance store lock poisoned").nwi = Some(nwi);
        self
    }

    pub fn with_tax_profile(self, tax: TaxProfile) -> Self {
        self.inner.lock().expect("finance store lock poisoned").tax = Some(tax);
        self
    }

    pub fn with_financial_plan(self, plan: FinancialPlan) -> Self {
        self.inner.lock().expect("finance store lock poisoned").plan = Some(plan);
        self
    }
}

#[async_trait]
impl FinanceStore for MemoryFinanceStore {
    async fn transactions(&self, _user_id: &str) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").transactions.clone())
    }

    async fn budgets(&self, _user_id: &str) -> Result<Vec<Budget>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").budgets.clone())
    }

    async fn stock_holdings(&self, _user_id: &str) -> Result<Vec<StockHolding>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").stocks.clone())
    }

    async fn mutual_funds(&self, _user_id: &str) -> Result<Vec<MutualFund>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").funds.clone())
    }

    async fn sips(&self, _user_id: &str) -> Result<Vec<Sip>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").sips.clone())
    }

    async fn goals(&self, _user_id: &str) -> Result<Vec<Goal>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").goals.clone())
    }

    async fn nwi_config(&self, _user_id: &str) -> Result<Option<NwiConfig>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").nwi.clone())
    }

    async fn tax_profile(&self, _user_id: &str) -> Result<Option<TaxProfile>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").tax.clone())
    }

    async fn financial_plan(&self, _user_id: &str) -> Result<Option<FinancialPlan>, StoreError> {
        Ok(self.inner.lock().expect("finance store lock poisoned").plan.clone())
    }
}
