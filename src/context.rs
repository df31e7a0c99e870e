//! Context collection for insight generation.
//!
//! Loads a user's financial records, computes numeric aggregates, and
//! serializes them into the human-readable text blocks the generator
//! consumes; a language model wants prose summaries, not raw tables.
//! Deterministic given identical upstream data; no side effects beyond
//! reads. Independent collection queries are issued concurrently and joined
//! before proceeding.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::PipelineError;
use crate::finance::{
    Budget, FinanceStore, FinancialPlan, Goal, MutualFund, NwiConfig, Sip, StockHolding,
    TaxProfile, Transaction, TxnDirection,
};
use crate::types::{InsightType, PipelineContext};

// ============================================================================
// Aggregates
// ============================================================================

/// Income and expenses for one calendar month
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyFlow {
    /// "YYYY-MM"
    pub month: String,
    pub income: f64,
    pub expenses: f64,
}

/// Numeric roll-up over a user's transaction history
#[derive(Debug, Clone, Default)]
pub struct SpendingAggregates {
    pub total_income: f64,
    pub total_expenses: f64,
    /// Percentage of income not spent; 0 when there is no income
    pub savings_rate: f64,
    /// Income minus expenses over the whole history
    pub account_balance: f64,
    /// Expenses divided by the day span of the history (inclusive)
    pub daily_average: f64,
    pub recurring_expenses: f64,
    pub one_time_expenses: f64,
    /// (category, spent) sorted by amount descending, then name
    pub category_breakdown: Vec<(String, f64)>,
    /// Chronologically sorted month-by-month flows
    pub monthly_trend: Vec<MonthlyFlow>,
}

/// Compute aggregates over a transaction history.
///
/// Deterministic: the category breakdown is sorted by amount descending with
/// the category name as tie-break, the monthly trend chronologically.
pub fn analyze_transactions(transactions: &[Transaction]) -> SpendingAggregates {
    let mut agg = SpendingAggregates::default();
    if transactions.is_empty() {
        return agg;
    }

    let mut categories: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    let mut months: std::collections::BTreeMap<String, (f64, f64)> =
        std::collections::BTreeMap::new();
    let mut first_date: NaiveDate = transactions[0].date;
    let mut last_date: NaiveDate = transactions[0].date;

    for txn in transactions {
        first_date = first_date.min(txn.date);
        last_date = last_date.max(txn.date);
        let month_key = format!("{:04}-{:02}", txn.date.year(), txn.date.month());
        let entry = months.entry(month_key).or_insert((0.0, 0.0));

        match txn.direction {
            TxnDirection::Income => {
                agg.total_income += txn.amount;
                entry.0 += txn.amount;
            }
            TxnDirection::Expense => {
                agg.total_expenses += txn.amount;
                entry.1 += txn.amount;
                *categories.entry(txn.category.clone()).or_insert(0.0) += txn.amount;
                if txn.recurring {
                    agg.recurring_expenses += txn.amount;
                } else {
                    agg.one_time_expenses += txn.amount;
                }
            }
        }
    }

    agg.account_balance = agg.total_income - agg.total_expenses;
    if agg.total_income > 0.0 {
        agg.savings_rate = (agg.total_income - agg.total_expenses) / agg.total_income * 100.0;
    }

    let span_days = (last_date - first_date).num_days() + 1;
    agg.daily_average = agg.total_expenses / span_days as f64;

    let mut breakdown: Vec<(String, f64)> = categories.into_iter().collect();
    breakdown.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    agg.category_breakdown = breakdown;

    agg.monthly_trend = months
        .into_iter()
        .map(|(month, (income, expenses))| MonthlyFlow {
            month,
            income,
            expenses,
        })
        .collect();

    agg
}

// ============================================================================
// Text Blocks
// ============================================================================

fn financial_context(agg: &SpendingAggregates, transaction_count: usize) -> String {
    if transaction_count == 0 {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&format!("Transactions analyzed: {}\n", transaction_count));
    out.push_str(&format!("Total income: {:.2}\n", agg.total_income));
    out.push_str(&format!("Total expenses: {:.2}\n", agg.total_expenses));
    out.push_str(&format!("Net balance: {:.2}\n", agg.account_balance));
    out.push_str(&format!("Savings rate: {:.1}%\n", agg.savings_rate));
    out.push_str(&format!("Average daily spend: {:.2}\n", agg.daily_average));
    out.push_str(&format!(
        "Recurring expenses: {:.2} | One-time expenses: {:.2}\n",
        agg.recurring_expenses, agg.one_time_expenses
    ));

    if !agg.category_breakdown.is_empty() {
        out.push_str("Spending by category:\n");
        for (category, amount) in &agg.category_breakdown {
            let percent = if agg.total_expenses > 0.0 {
                amount / agg.total_expenses * 100.0
            } else {
                0.0
            };
            out.push_str(&format!("- {}: {:.2} ({:.1}%)\n", category, amount, percent));
        }
    }

    if agg.monthly_trend.len() > 1 {
        out.push_str("Monthly trend:\n");
        for flow in &agg.monthly_trend {
            out.push_str(&format!(
                "- {}: income {:.2}, expenses {:.2}\n",
                flow.month, flow.income, flow.expenses
            ));
        }
    }

    out
}

fn health_context(agg: &SpendingAggregates) -> String {
    if agg.total_income <= 0.0 && agg.total_expenses <= 0.0 {
        return String::new();
    }

    let rating = if agg.savings_rate >= 20.0 {
        "strong"
    } else if agg.savings_rate >= 10.0 {
        "moderate"
    } else {
        "low"
    };

    let mut out = String::new();
    out.push_str(&format!("Savings rate {:.1}% ({}).\n", agg.savings_rate, rating));
    if agg.total_income > 0.0 {
        out.push_str(&format!(
            "Expense-to-income ratio {:.1}%.\n",
            agg.total_expenses / agg.total_income * 100.0
        ));
    }
    if agg.total_expenses > 0.0 {
        out.push_str(&format!(
            "Recurring share of spending {:.1}%.\n",
            agg.recurring_expenses / agg.total_expenses * 100.0
        ));
    }
    out
}

fn current_month_context(
    transactions: &[Transaction],
    budgets: &[Budget],
    now: DateTime<Utc>,
) -> String {
    let today = now.date_naive();
    let current: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.date.year() == today.year() && t.date.month() == today.month())
        .collect();

    let mut income = 0.0;
    let mut expenses = 0.0;
    let mut categories: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();
    for txn in &current {
        match txn.direction {
            TxnDirection::Income => income += txn.amount,
            TxnDirection::Expense => {
                expenses += txn.amount;
                *categories.entry(txn.category.as_str()).or_insert(0.0) += txn.amount;
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Current month ({:04}-{:02}): {} transactions so far.\n",
        today.year(),
        today.month(),
        current.len()
    ));
    out.push_str(&format!("Income so far: {:.2}\n", income));
    out.push_str(&format!("Spent so far: {:.2}\n", expenses));

    if !categories.is_empty() {
        let mut sorted: Vec<(&str, f64)> = categories.into_iter().collect();
        sorted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        out.push_str("Spent this month by category:\n");
        for (category, amount) in sorted {
            out.push_str(&format!("- {}: {:.2}\n", category, amount));
        }
    }

    if !budgets.is_empty() {
        out.push_str("Budget limits:\n");
        for budget in budgets {
            let spent = current
                .iter()
                .filter(|t| t.direction == TxnDirection::Expense && t.category == budget.category)
                .map(|t| t.amount)
                .sum::<f64>();
            out.push_str(&format!(
                "- {}: limit {:.2}, spent {:.2}\n",
                budget.category, budget.monthly_limit, spent
            ));
        }
    }

    out
}

fn nwi_context(config: Option<&NwiConfig>) -> String {
    let Some(config) = config else {
        return String::new();
    };

    let mut out = format!(
        "Configured split: needs {:.0}%, wants {:.0}%, investments {:.0}%.\n",
        config.needs_percent, config.wants_percent, config.investments_percent
    );
    if let Some(income) = config.monthly_income {
        out.push_str(&format!("Reported monthly income: {:.2}\n", income));
    }
    out
}

fn gain_percent(invested: f64, current: f64) -> Option<f64> {
    if invested > 0.0 {
        Some((current - invested) / invested * 100.0)
    } else {
        None
    }
}

fn investment_context(stocks: &[StockHolding], funds: &[MutualFund], sips: &[Sip]) -> String {
    if stocks.is_empty() && funds.is_empty() && sips.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut total_invested = 0.0;
    let mut total_current = 0.0;

    if !stocks.is_empty() {
        out.push_str("Stock holdings:\n");
        for stock in stocks {
            total_invested += stock.invested;
            total_current += stock.current_value;
            match gain_percent(stock.invested, stock.current_value) {
                Some(gain) => out.push_str(&format!(
                    "- {} ({}): qty {}, invested {:.2}, current {:.2} ({:+.1}%)\n",
                    stock.symbol, stock.name, stock.quantity, stock.invested, stock.current_value, gain
                )),
                None => out.push_str(&format!(
                    "- {} ({}): qty {}, invested {:.2}, current {:.2}\n",
                    stock.symbol, stock.name, stock.quantity, stock.invested, stock.current_value
                )),
            }
        }
    }

    if !funds.is_empty() {
        out.push_str("Mutual funds:\n");
        for fund in funds {
            total_invested += fund.invested;
            total_current += fund.current_value;
            match gain_percent(fund.invested, fund.current_value) {
                Some(gain) => out.push_str(&format!(
                    "- {}: invested {:.2}, current {:.2} ({:+.1}%)\n",
                    fund.name, fund.invested, fund.current_value, gain
                )),
                None => out.push_str(&format!(
                    "- {}: invested {:.2}, current {:.2}\n",
                    fund.name, fund.invested, fund.current_value
                )),
            }
        }
    }

    let active_sips: Vec<&Sip> = sips.iter().filter(|s| s.active).collect();
    if !active_sips.is_empty() {
        out.push_str("Active SIPs:\n");
        for sip in active_sips {
            out.push_str(&format!("- {}: {:.2}/month\n", sip.fund_name, sip.monthly_amount));
        }
    }

    if total_invested > 0.0 {
        match gain_percent(total_invested, total_current) {
            Some(gain) => out.push_str(&format!(
                "Portfolio totals: invested {:.2}, current value {:.2} ({:+.1}%)\n",
                total_invested, total_current, gain
            )),
            None => out.push_str(&format!(
                "Portfolio totals: invested {:.2}, current value {:.2}\n",
                total_invested, total_current
            )),
        }
    }

    out
}

fn goals_context(goals: &[Goal]) -> String {
    if goals.is_empty() {
        return String::new();
    }

    let mut out = String::from("Goals:\n");
    for goal in goals {
        let progress = if goal.target_amount > 0.0 {
            goal.saved_amount / goal.target_amount * 100.0
        } else {
            0.0
        };
        match goal.target_date {
            Some(date) => out.push_str(&format!(
                "- {}: {:.2} of {:.2} ({:.1}%), target {}\n",
                goal.name, goal.saved_amount, goal.target_amount, progress, date
            )),
            None => out.push_str(&format!(
                "- {}: {:.2} of {:.2} ({:.1}%)\n",
                goal.name, goal.saved_amount, goal.target_amount, progress
            )),
        }
    }
    out
}

fn tax_context(profile: Option<&TaxProfile>) -> String {
    let Some(profile) = profile else {
        return String::new();
    };

    let mut out = String::new();
    out.push_str(&format!("Tax regime: {}\n", profile.regime));
    out.push_str(&format!("Annual income: {:.2}\n", profile.annual_income));
    if !profile.deductions.is_empty() {
        out.push_str("Declared deductions:\n");
        let mut total = 0.0;
        for deduction in &profile.deductions {
            total += deduction.amount;
            out.push_str(&format!("- {}: {:.2}\n", deduction.code, deduction.amount));
        }
        out.push_str(&format!("Total declared deductions: {:.2}\n", total));
    }
    out
}

fn planner_context(plan: Option<&FinancialPlan>) -> String {
    let Some(plan) = plan else {
        return String::new();
    };

    let mut out = String::new();
    out.push_str(&format!(
        "Plan \"{}\": invest {:.2}/month\n",
        plan.name, plan.monthly_investment
    ));
    out.push_str(&format!(
        "Allocation: equity {:.0}%, debt {:.0}%, cash {:.0}%\n",
        plan.equity_percent, plan.debt_percent, plan.cash_percent
    ));
    if let Some(notes) = &plan.notes {
        out.push_str(&format!("Notes: {}\n", notes));
    }
    out
}

// ============================================================================
// Collector
// ============================================================================

/// Build the pipeline context for one run.
///
/// Fails fast with [`PipelineError::NoData`] when the user has zero
/// transactions and the requested type needs them, before any paid
/// generation call. The market block stays empty here; enrichment merges it
/// in later for investment insights.
pub async fn collect(
    store: &dyn FinanceStore,
    user_id: &str,
    insight_type: InsightType,
    now: DateTime<Utc>,
) -> Result<PipelineContext, PipelineError> {
    let transactions = store.transactions(user_id).await?;
    if transactions.is_empty() && insight_type.requires_transactions() {
        return Err(PipelineError::NoData {
            user_id: user_id.to_string(),
            insight_type,
        });
    }

    let aggregates = analyze_transactions(&transactions);
    let mut ctx = PipelineContext {
        transaction_count: transactions.len(),
        ..Default::default()
    };

    match insight_type {
        InsightType::SpendingAnalysis => {
            ctx.financial_context = financial_context(&aggregates, transactions.len());
            ctx.health_context = health_context(&aggregates);
        }
        InsightType::MonthlyBudget | InsightType::WeeklyBudget => {
            let (budgets, nwi) =
                tokio::try_join!(store.budgets(user_id), store.nwi_config(user_id))?;
            ctx.financial_context = financial_context(&aggregates, transactions.len());
            ctx.current_month_context = current_month_context(&transactions, &budgets, now);
            ctx.nwi_context = nwi_context(nwi.as_ref());
        }
        InsightType::InvestmentInsights => {
            let (stocks, funds, sips, goals) = tokio::try_join!(
                store.stock_holdings(user_id),
                store.mutual_funds(user_id),
                store.sips(user_id),
                store.goals(user_id)
            )?;
            ctx.stock_symbols = stocks.iter().map(|s| s.symbol.clone()).collect();
            ctx.fund_names = funds.iter().map(|f| f.name.clone()).collect();
            ctx.investment_context = investment_context(&stocks, &funds, &sips);
            ctx.goals_context = goals_context(&goals);
        }
        InsightType::TaxOptimization => {
            let tax = store.tax_profile(user_id).await?;
            ctx.tax_context = tax_context(tax.as_ref());
            ctx.financial_context = financial_context(&aggregates, transactions.len());
        }
        InsightType::PlannerRecommendation => {
            let (plan, stocks, funds, sips, goals) = tokio::try_join!(
                store.financial_plan(user_id),
                store.stock_holdings(user_id),
                store.mutual_funds(user_id),
                store.sips(user_id),
                store.goals(user_id)
            )?;
            ctx.planner_context = planner_context(plan.as_ref());
            ctx.financial_context = financial_context(&aggregates, transactions.len());
            ctx.investment_context = investment_context(&stocks, &funds, &sips);
            ctx.goals_context = goals_context(&goals);
        }
    }

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::MemoryFinanceStore;
    use chrono::TimeZone;

    fn txn(
        id: &str,
        date: &str,
        amount: f64,
        category: &str,
        direction: TxnDirection,
        recurring: bool,
    ) -> Transaction {
        Transaction {
            id: id.to_string(),
            user_id: "u-1".to_string(),
            date: date.parse().unwrap(),
            amount,
            category: category.to_string(),
            description: None,
            direction,
            recurring,
        }
    }

    fn fixture_transactions() -> Vec<Transaction> {
        vec![
            txn("t1", "2026-07-01", 50000.0, "Salary", TxnDirection::Income, true),
            txn("t2", "2026-07-03", 12000.0, "Rent", TxnDirection::Expense, true),
            txn("t3", "2026-07-10", 4500.0, "Food", TxnDirection::Expense, false),
            txn("t4", "2026-07-15", 4500.0, "Entertainment", TxnDirection::Expense, false),
            txn("t5", "2026-08-01", 50000.0, "Salary", TxnDirection::Income, true),
            txn("t6", "2026-08-05", 3000.0, "Food", TxnDirection::Expense, false),
        ]
    }

    #[test]
    fn test_aggregates_are_deterministic() {
        let agg = analyze_transactions(&fixture_transactions());
        assert_eq!(agg.total_income, 100000.0);
        assert_eq!(agg.total_expenses, 24000.0);
        assert_eq!(agg.account_balance, 76000.0);
        assert!((agg.savings_rate - 76.0).abs() < 1e-9);
        assert_eq!(agg.recurring_expenses, 12000.0);
        assert_eq!(agg.one_time_expenses, 12000.0);

        // Sorted by amount descending
        assert_eq!(
            agg.category_breakdown,
            vec![
                ("Rent".to_string(), 12000.0),
                ("Food".to_string(), 7500.0),
                ("Entertainment".to_string(), 4500.0),
            ]
        );

        assert_eq!(agg.monthly_trend.len(), 2);
        assert_eq!(agg.monthly_trend[0].month, "2026-07");
        assert_eq!(agg.monthly_trend[1].month, "2026-08");

        // 2026-07-01 to 2026-08-05 inclusive is 36 days
        assert!((agg.daily_average - 24000.0 / 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_category_tie_breaks_by_name() {
        let txns = vec![
            txn("a", "2026-08-01", 100.0, "Zoo", TxnDirection::Expense, false),
            txn("b", "2026-08-01", 100.0, "Art", TxnDirection::Expense, false),
        ];
        let agg = analyze_transactions(&txns);
        assert_eq!(agg.category_breakdown[0].0, "Art");
        assert_eq!(agg.category_breakdown[1].0, "Zoo");
    }

    #[test]
    fn test_empty_history_yields_zeroed_aggregates() {
        let agg = analyze_transactions(&[]);
        assert_eq!(agg.total_income, 0.0);
        assert_eq!(agg.daily_average, 0.0);
        assert!(agg.category_breakdown.is_empty());
    }

    #[tokio::test]
    async fn test_no_transactions_fails_fast_for_spending_analysis() {
        let store = MemoryFinanceStore::new();
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let err = collect(&store, "u-1", InsightType::SpendingAnalysis, now)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));
    }

    #[tokio::test]
    async fn test_no_transactions_still_collects_for_investments() {
        let store = MemoryFinanceStore::new().with_stocks(vec![StockHolding {
            symbol: "INFY".to_string(),
            name: "Infosys".to_string(),
            quantity: 10.0,
            invested: 14000.0,
            current_value: 16500.0,
        }]);
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let ctx = collect(&store, "u-1", InsightType::InvestmentInsights, now)
            .await
            .unwrap();
        assert_eq!(ctx.transaction_count, 0);
        assert_eq!(ctx.stock_symbols, vec!["INFY".to_string()]);
        assert!(ctx.investment_context.contains("INFY (Infosys)"));
        assert!(ctx.investment_context.contains("+17.9%"));
    }

    #[tokio::test]
    async fn test_current_month_block_only_counts_this_month() {
        let store = MemoryFinanceStore::new()
            .with_transactions(fixture_transactions())
            .with_budgets(vec![Budget {
                category: "Food".to_string(),
                monthly_limit: 8000.0,
            }]);
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let ctx = collect(&store, "u-1", InsightType::MonthlyBudget, now)
            .await
            .unwrap();
        assert!(ctx.current_month_context.contains("Current month (2026-08): 2 transactions"));
        assert!(ctx.current_month_context.contains("Spent so far: 3000.00"));
        assert!(ctx.current_month_context.contains("- Food: limit 8000.00, spent 3000.00"));
    }

    #[tokio::test]
    async fn test_planner_context_includes_plan_and_goals() {
        let store = MemoryFinanceStore::new()
            .with_financial_plan(FinancialPlan {
                name: "Steady growth".to_string(),
                monthly_investment: 20000.0,
                equity_percent: 70.0,
                debt_percent: 20.0,
                cash_percent: 10.0,
                notes: None,
            })
            .with_goals(vec![Goal {
                name: "Emergency fund".to_string(),
                target_amount: 100000.0,
                saved_amount: 45000.0,
                target_date: None,
            }]);
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let ctx = collect(&store, "u-1", InsightType::PlannerRecommendation, now)
            .await
            .unwrap();
        assert!(ctx.planner_context.contains("Plan \"Steady growth\""));
        assert!(ctx.planner_context.contains("equity 70%"));
        assert!(ctx.goals_context.contains("Emergency fund: 45000.00 of 100000.00 (45.0%)"));
    }
}
