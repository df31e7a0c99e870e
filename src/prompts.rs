//! Prompt building for the insight generator.
//!
//! A fixed system-prompt table keyed by insight type, and a user message
//! assembled from the non-empty context blocks relevant to that type. Both
//! are byte-stable for identical input; tests assert exact text.

use crate::generate::GenMessage;
use crate::types::{InsightType, PipelineContext};

// ============================================================================
// System Prompts
// ============================================================================

const SPENDING_ANALYSIS_PROMPT: &str = r#"You are a personal-finance analyst reviewing a user's spending history.

Respond with ONLY a JSON object in exactly this shape, no markdown fences, no text before or after:
{
  "healthScore": <number 0-100>,
  "topCategories": [{"category": "<name>", "amount": <number>, "percent": <number>}],
  "summary": {"totalIncome": <number>, "totalExpenses": <number>, "savingsRate": <number>},
  "actionItems": ["<specific action>"],
  "alerts": ["<concerning pattern, empty array if none>"],
  "keyInsight": "<single most important takeaway>"
}

Rules:
1. healthScore weighs savings rate, spending concentration and alert count.
2. topCategories lists at most 5 categories, largest first.
3. actionItems are concrete and measurable, 2-4 of them.
4. Output nothing except the JSON object."#;

const MONTHLY_BUDGET_PROMPT: &str = r#"You are a budgeting assistant preparing next month's plan from a user's actual spending.

Respond with ONLY a JSON object in exactly this shape, no markdown fences, no text before or after:
{
  "needs": {"amount": <number>, "percent": <number>, "categories": ["<category>"]},
  "wants": {"amount": <number>, "percent": <number>, "categories": ["<category>"]},
  "savingsInvestments": {"amount": <number>, "percent": <number>, "categories": ["<category>"]},
  "totalBudget": <number>,
  "recommendations": ["<adjustment to hit the split>"],
  "summary": "<one-paragraph overview>"
}

Rules:
1. Respect the user's configured needs/wants/investments split when one is given; otherwise use 50/30/20.
2. Amounts are monthly figures in the user's currency.
3. Output nothing except the JSON object."#;

const WEEKLY_BUDGET_PROMPT: &str = r#"You are a budgeting assistant setting spending targets for the coming week from a user's current-month spending.

Respond with ONLY a JSON object in exactly this shape, no markdown fences, no text before or after:
{
  "weeklyTarget": <number>,
  "dailyLimit": <number>,
  "focusAreas": ["<category to watch this week>"],
  "tips": ["<practical tip>"],
  "summary": "<one-paragraph overview>"
}

Rules:
1. weeklyTarget and dailyLimit must be consistent with the remaining monthly headroom.
2. focusAreas names the categories trending over budget.
3. Output nothing except the JSON object."#;

const INVESTMENT_INSIGHTS_PROMPT: &str = r#"You are an investment analyst reviewing a user's portfolio of stocks, mutual funds and SIPs.

Respond with ONLY a JSON object in exactly this shape, no markdown fences, no text before or after:
{
  "portfolioValue": <number>,
  "diversification": {"score": <number 0-100>, "summary": "<assessment>", "gaps": ["<missing exposure>"]},
  "performance": "<one-paragraph performance assessment>",
  "recommendations": ["<specific, actionable step>"],
  "riskLevel": "<low|moderate|high>",
  "marketOutlook": "<outlook grounded in the market context if provided>"
}

Rules:
1. Base portfolioValue on the holdings provided, not on estimates.
2. Use the market context section only when it is present.
3. Never recommend specific trade timing.
4. Output nothing except the JSON object."#;

const TAX_OPTIMIZATION_PROMPT: &str = r#"You are a tax advisor reviewing a user's tax configuration and income.

Respond with ONLY a JSON object in exactly this shape, no markdown fences, no text before or after:
{
  "regime": "<old|new>",
  "tips": ["<specific tax-saving step>"],
  "potentialSavings": <number>,
  "regimeSuggestion": "<whether to switch regimes and why>",
  "unusedDeductions": ["<deduction section with remaining headroom>"]
}

Rules:
1. regime echoes the user's current regime.
2. tips are ordered by estimated savings, largest first, 3-5 of them.
3. Output nothing except the JSON object."#;

const PLANNER_RECOMMENDATION_PROMPT: &str = r#"You are a financial planner reviewing a user's saved plan against their actual finances.

Respond with ONLY a JSON object in exactly this shape, no markdown fences, no text before or after:
{
  "planScore": <number 0-100>,
  "allocationReview": "<assessment of the equity/debt/cash split>",
  "adjustments": ["<concrete change to the plan>"],
  "milestones": ["<checkpoint with a timeframe>"],
  "summary": "<one-paragraph overview>"
}

Rules:
1. planScore reflects how well the plan matches income, spending and goals.
2. adjustments are 2-4 concrete changes, most impactful first.
3. Output nothing except the JSON object."#;

/// Fixed system instruction for an insight type.
pub fn system_prompt(insight_type: InsightType) -> &'static str {
    match insight_type {
        InsightType::SpendingAnalysis => SPENDING_ANALYSIS_PROMPT,
        InsightType::MonthlyBudget => MONTHLY_BUDGET_PROMPT,
        InsightType::WeeklyBudget => WEEKLY_BUDGET_PROMPT,
        InsightType::InvestmentInsights => INVESTMENT_INSIGHTS_PROMPT,
        InsightType::TaxOptimization => TAX_OPTIMIZATION_PROMPT,
        InsightType::PlannerRecommendation => PLANNER_RECOMMENDATION_PROMPT,
    }
}

// ============================================================================
// User Message
// ============================================================================

fn task_line(insight_type: InsightType) -> &'static str {
    match insight_type {
        InsightType::SpendingAnalysis => {
            "Task: analyze this user's spending and return the JSON object described above."
        }
        InsightType::MonthlyBudget => {
            "Task: propose next month's budget for this user and return the JSON object described above."
        }
        InsightType::WeeklyBudget => {
            "Task: set this user's spending targets for the coming week and return the JSON object described above."
        }
        InsightType::InvestmentInsights => {
            "Task: review this user's portfolio and return the JSON object described above."
        }
        InsightType::TaxOptimization => {
            "Task: identify tax-saving opportunities for this user and return the JSON object described above."
        }
        InsightType::PlannerRecommendation => {
            "Task: evaluate this user's financial plan and return the JSON object described above."
        }
    }
}

/// The context blocks relevant to an insight type, in presentation order.
fn relevant_blocks(insight_type: InsightType, ctx: &PipelineContext) -> Vec<(&'static str, &str)> {
    match insight_type {
        InsightType::SpendingAnalysis => vec![
            ("FINANCIAL OVERVIEW", ctx.financial_context.as_str()),
            ("FINANCIAL HEALTH", ctx.health_context.as_str()),
        ],
        InsightType::MonthlyBudget | InsightType::WeeklyBudget => vec![
            ("FINANCIAL OVERVIEW", ctx.financial_context.as_str()),
            ("CURRENT MONTH", ctx.current_month_context.as_str()),
            ("BUDGET FRAMEWORK", ctx.nwi_context.as_str()),
        ],
        InsightType::InvestmentInsights => vec![
            ("INVESTMENTS", ctx.investment_context.as_str()),
            ("GOALS", ctx.goals_context.as_str()),
            ("MARKET CONTEXT", ctx.market_context.as_str()),
        ],
        InsightType::TaxOptimization => vec![
            ("TAX PROFILE", ctx.tax_context.as_str()),
            ("FINANCIAL OVERVIEW", ctx.financial_context.as_str()),
        ],
        InsightType::PlannerRecommendation => vec![
            ("FINANCIAL PLAN", ctx.planner_context.as_str()),
            ("FINANCIAL OVERVIEW", ctx.financial_context.as_str()),
            ("INVESTMENTS", ctx.investment_context.as_str()),
            ("GOALS", ctx.goals_context.as_str()),
        ],
    }
}

/// Serialize the context into a single user message: each non-empty relevant
/// block under its own heading, then a one-line task restatement.
pub fn build_user_message(insight_type: InsightType, ctx: &PipelineContext) -> String {
    let mut parts: Vec<String> = relevant_blocks(insight_type, ctx)
        .into_iter()
        .filter(|(_, block)| !block.trim().is_empty())
        .map(|(heading, block)| format!("{}:\n{}", heading, block.trim_end()))
        .collect();

    parts.push(task_line(insight_type).to_string());
    parts.join("\n\n")
}

/// System + user message pair for one generation call.
pub fn build_messages(insight_type: InsightType, ctx: &PipelineContext) -> Vec<GenMessage> {
    vec![
        GenMessage::system(system_prompt(insight_type)),
        GenMessage::user(build_user_message(insight_type, ctx)),
    ]
}
