//! Schema dispatch and section normalization.
//!
//! The generator never labels which of the six schemas it produced, so the
//! parsed object is classified post-hoc by the presence of characteristic
//! fields, in a fixed priority order, first match wins. Each matched shape
//! converts into an ordered list of [`InsightSection`]s reflecting that
//! domain's emphasis, and a single shared renderer turns sections into
//! markdown, so `sections` and `content` can differ in formatting but never
//! in meaning.
//!
//! Field-shape sniffing is deliberate: asking the generator to self-identify
//! its schema would be one more field it could get wrong, and presence
//! heuristics tolerate minor prompt drift without breaking all six types at
//! once.

use serde_json::Value;

use crate::parsing::parse_response;
use crate::types::{
    AllocationBand, InsightSection, InvestmentInsights, MonthlyBudget, PlannerRecommendation,
    SectionKind, Severity, SpendingAnalysis, StructuredData, TaxTips, WeeklyBudget,
};

/// Normalized output of parse + dispatch: always a markdown `content`,
/// optionally sections and the typed payload behind them.
#[derive(Debug, Clone)]
pub struct NormalizedInsight {
    pub content: String,
    pub sections: Option<Vec<InsightSection>>,
    pub structured_data: Option<StructuredData>,
}

/// Parse raw generator text and normalize whatever structure it holds.
///
/// Never fails: unmatched or malformed structure degrades to the raw text
/// as unstructured markdown content.
pub fn normalize_response(raw: &str) -> NormalizedInsight {
    let Some(value) = parse_response(raw) else {
        return NormalizedInsight {
            content: raw.to_string(),
            sections: None,
            structured_data: None,
        };
    };

    if let Some(data) = classify(&value) {
        let sections = sections_for(&data);
        return NormalizedInsight {
            content: render_markdown(&sections),
            sections: Some(sections),
            structured_data: Some(data),
        };
    }

    if let Some(sections) = legacy_sections(&value) {
        return NormalizedInsight {
            content: render_markdown(&sections),
            sections: Some(sections),
            structured_data: None,
        };
    }

    NormalizedInsight {
        content: raw.to_string(),
        sections: None,
        structured_data: None,
    }
}

// ============================================================================
// Classification
// ============================================================================

fn has_field(value: &Value, key: &str) -> bool {
    value.get(key).is_some()
}

/// Classify a parsed object against the six known shapes.
///
/// Fixed priority, first match wins, no confidence scoring. A matched shape
/// that still fails typed deserialization (e.g. a string where a number is
/// mandated) counts as unclassified.
pub fn classify(value: &Value) -> Option<StructuredData> {
    if !value.is_object() {
        return None;
    }

    let candidate: Option<Result<StructuredData, serde_json::Error>> =
        if has_field(value, "tips") && has_field(value, "regime") {
            Some(serde_json::from_value::<TaxTips>(value.clone()).map(StructuredData::TaxTips))
        } else if has_field(value, "healthScore") && has_field(value, "topCategories") {
            Some(
                serde_json::from_value::<SpendingAnalysis>(value.clone())
                    .map(StructuredData::SpendingAnalysis),
            )
        } else if has_field(value, "needs")
            && has_field(value, "wants")
            && has_field(value, "savingsInvestments")
        {
            Some(
                serde_json::from_value::<MonthlyBudget>(value.clone())
                    .map(StructuredData::MonthlyBudget),
            )
        } else if has_field(value, "weeklyTarget") && has_field(value, "dailyLimit") {
            Some(
                serde_json::from_value::<WeeklyBudget>(value.clone())
                    .map(StructuredData::WeeklyBudget),
            )
        } else if has_field(value, "portfolioValue") && has_field(value, "diversification") {
            Some(
                serde_json::from_value::<InvestmentInsights>(value.clone())
                    .map(StructuredData::InvestmentInsights),
            )
        } else if has_field(value, "planScore") && has_field(value, "allocationReview") {
            Some(
                serde_json::from_value::<PlannerRecommendation>(value.clone())
                    .map(StructuredData::PlannerRecommendation),
            )
        } else {
            None
        };

    match candidate? {
        Ok(data) => Some(data),
        Err(e) => {
            log::warn!("response matched a known shape but failed typed decoding: {}", e);
            None
        }
    }
}

/// Decode the generic legacy shape: a top-level `sections` list whose
/// elements carry `id`, `title` and `type`. Elements failing validation are
/// skipped; severities outside the fixed enum drop to `None`.
fn legacy_sections(value: &Value) -> Option<Vec<InsightSection>> {
    let list = value.get("sections")?.as_array()?;

    let mut sections = Vec::new();
    for item in list {
        let Some(obj) = item.as_object() else { continue };
        let (Some(id), Some(title), Some(kind)) = (
            obj.get("id").and_then(Value::as_str),
            obj.get("title").and_then(Value::as_str),
            obj.get("type").and_then(Value::as_str).and_then(SectionKind::parse),
        ) else {
            continue;
        };

        let severity = obj
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::parse);

        sections.push(InsightSection {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            text: obj.get("text").and_then(Value::as_str).map(str::to_string),
            items: obj.get("items").and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            }),
            highlight: obj
                .get("highlight")
                .and_then(Value::as_str)
                .map(str::to_string),
            severity,
        });
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections)
    }
}

// ============================================================================
// Converters
// ============================================================================

/// Build the ordered section list for a typed payload.
pub fn sections_for(data: &StructuredData) -> Vec<InsightSection> {
    match data {
        StructuredData::SpendingAnalysis(d) => spending_sections(d),
        StructuredData::MonthlyBudget(d) => monthly_budget_sections(d),
        StructuredData::WeeklyBudget(d) => weekly_budget_sections(d),
        StructuredData::InvestmentInsights(d) => investment_sections(d),
        StructuredData::TaxTips(d) => tax_sections(d),
        StructuredData::PlannerRecommendation(d) => planner_sections(d),
    }
}

fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

/// Order: overview → top categories → action items → alerts → key takeaway.
fn spending_sections(d: &SpendingAnalysis) -> Vec<InsightSection> {
    let mut sections = Vec::new();

    let overview = match &d.summary {
        Some(s) => format!(
            "Spending health score: {:.0}/100. Income {}, expenses {}, savings rate {:.1}%.",
            d.health_score,
            format_amount(s.total_income),
            format_amount(s.total_expenses),
            s.savings_rate
        ),
        None => format!("Spending health score: {:.0}/100.", d.health_score),
    };
    let overview_severity = if d.health_score >= 70.0 {
        Severity::Positive
    } else if d.health_score >= 40.0 {
        Severity::Neutral
    } else {
        Severity::Warning
    };
    sections.push(
        InsightSection::summary("overview", "Overview", overview).with_severity(overview_severity),
    );

    if !d.top_categories.is_empty() {
        let items = d
            .top_categories
            .iter()
            .map(|c| match c.percent {
                Some(p) => format!("{}: {} ({:.1}%)", c.category, format_amount(c.amount), p),
                None => format!("{}: {}", c.category, format_amount(c.amount)),
            })
            .collect();
        sections.push(InsightSection::list(
            "top_categories",
            "Top Spending Categories",
            items,
        ));
    }

    if !d.action_items.is_empty() {
        sections.push(InsightSection::numbered_list(
            "action_items",
            "Action Items",
            d.action_items.clone(),
        ));
    }

    if !d.alerts.is_empty() {
        sections.push(
            InsightSection::list("alerts", "Alerts", d.alerts.clone())
                .with_severity(Severity::Warning),
        );
    }

    if let Some(key_insight) = &d.key_insight {
        sections.push(InsightSection::highlight(
            "key_takeaway",
            "Key Takeaway",
            key_insight.clone(),
        ));
    }

    sections
}

/// Order: overview → allocation → recommendations → total budget.
fn monthly_budget_sections(d: &MonthlyBudget) -> Vec<InsightSection> {
    let mut sections = Vec::new();

    let overview = d
        .summary
        .clone()
        .unwrap_or_else(|| "Suggested monthly budget across needs, wants and savings/investments.".to_string());
    sections.push(InsightSection::summary("overview", "Overview", overview));

    let band = |label: &str, band: &AllocationBand| match band.percent {
        Some(p) => format!("{}: {} ({:.0}%)", label, format_amount(band.amount), p),
        None => format!("{}: {}", label, format_amount(band.amount)),
    };
    sections.push(InsightSection::list(
        "allocation",
        "Budget Allocation",
        vec![
            band("Needs", &d.needs),
            band("Wants", &d.wants),
            band("Savings & Investments", &d.savings_investments),
        ],
    ));

    if !d.recommendations.is_empty() {
        sections.push(InsightSection::numbered_list(
            "recommendations",
            "Recommendations",
            d.recommendations.clone(),
        ));
    }

    if let Some(total) = d.total_budget {
        sections.push(InsightSection::highlight(
            "total_budget",
            "Total Monthly Budget",
            format_amount(total),
        ));
    }

    sections
}

/// Order: overview → targets → focus areas → tips.
fn weekly_budget_sections(d: &WeeklyBudget) -> Vec<InsightSection> {
    let mut sections = Vec::new();

    let overview = d
        .summary
        .clone()
        .unwrap_or_else(|| "Suggested spending targets for the coming week.".to_string());
    sections.push(InsightSection::summary("overview", "Overview", overview));

    sections.push(InsightSection::highlight(
        "targets",
        "Weekly Targets",
        format!(
            "Weekly target {} with a daily limit of {}",
            format_amount(d.weekly_target),
            format_amount(d.daily_limit)
        ),
    ));

    if !d.focus_areas.is_empty() {
        sections.push(InsightSection::list(
            "focus_areas",
            "Focus Areas",
            d.focus_areas.clone(),
        ));
    }

    if !d.tips.is_empty() {
        sections.push(InsightSection::numbered_list("tips", "Tips", d.tips.clone()));
    }

    sections
}

/// Order: overview → diversification → recommendations → market outlook →
/// risk level.
fn investment_sections(d: &InvestmentInsights) -> Vec<InsightSection> {
    let mut sections = Vec::new();

    let overview = match &d.performance {
        Some(p) => format!(
            "Portfolio value {}. {}",
            format_amount(d.portfolio_value),
            p
        ),
        None => format!("Portfolio value {}.", format_amount(d.portfolio_value)),
    };
    sections.push(InsightSection::summary("overview", "Overview", overview));

    if !d.diversification.gaps.is_empty() {
        sections.push(InsightSection::list(
            "diversification",
            "Diversification Gaps",
            d.diversification.gaps.clone(),
        ));
    } else if let Some(summary) = &d.diversification.summary {
        let text = match d.diversification.score {
            Some(score) => format!("Score {:.0}/100. {}", score, summary),
            None => summary.clone(),
        };
        sections.push(InsightSection::summary("diversification", "Diversification", text));
    }

    if !d.recommendations.is_empty() {
        sections.push(InsightSection::numbered_list(
            "recommendations",
            "Recommendations",
            d.recommendations.clone(),
        ));
    }

    if let Some(outlook) = &d.market_outlook {
        sections.push(InsightSection::summary(
            "market_outlook",
            "Market Outlook",
            outlook.clone(),
        ));
    }

    if let Some(risk) = &d.risk_level {
        let severity = match risk.to_lowercase() {
            r if r.contains("high") => Severity::Warning,
            r if r.contains("low") => Severity::Positive,
            _ => Severity::Neutral,
        };
        sections.push(
            InsightSection::highlight("risk_level", "Risk Level", risk.clone())
                .with_severity(severity),
        );
    }

    sections
}

/// Order: overview → tips → unused deductions → regime suggestion.
fn tax_sections(d: &TaxTips) -> Vec<InsightSection> {
    let mut sections = Vec::new();

    let overview = match d.potential_savings {
        Some(savings) => format!(
            "Current regime: {}. Potential additional savings: {}.",
            d.regime,
            format_amount(savings)
        ),
        None => format!("Current regime: {}.", d.regime),
    };
    sections.push(InsightSection::summary("overview", "Overview", overview));

    if !d.tips.is_empty() {
        sections.push(InsightSection::numbered_list(
            "tips",
            "Tax-Saving Tips",
            d.tips.clone(),
        ));
    }

    if !d.unused_deductions.is_empty() {
        sections.push(
            InsightSection::list(
                "unused_deductions",
                "Unused Deductions",
                d.unused_deductions.clone(),
            )
            .with_severity(Severity::Warning),
        );
    }

    if let Some(suggestion) = &d.regime_suggestion {
        sections.push(InsightSection::highlight(
            "regime_suggestion",
            "Regime Suggestion",
            suggestion.clone(),
        ));
    }

    sections
}

/// Order: overview → plan score → allocation review → adjustments →
/// milestones.
fn planner_sections(d: &PlannerRecommendation) -> Vec<InsightSection> {
    let mut sections = Vec::new();

    let overview = d
        .summary
        .clone()
        .unwrap_or_else(|| "Review of your saved financial plan.".to_string());
    sections.push(InsightSection::summary("overview", "Overview", overview));

    let severity = if d.plan_score >= 75.0 {
        Severity::Positive
    } else if d.plan_score < 50.0 {
        Severity::Warning
    } else {
        Severity::Neutral
    };
    sections.push(
        InsightSection::highlight(
            "plan_score",
            "Plan Score",
            format!("{:.0}/100", d.plan_score),
        )
        .with_severity(severity),
    );

    sections.push(InsightSection::summary(
        "allocation_review",
        "Allocation Review",
        d.allocation_review.clone(),
    ));

    if !d.adjustments.is_empty() {
        sections.push(InsightSection::numbered_list(
            "adjustments",
            "Suggested Adjustments",
            d.adjustments.clone(),
        ));
    }

    if !d.milestones.is_empty() {
        sections.push(InsightSection::list(
            "milestones",
            "Milestones",
            d.milestones.clone(),
        ));
    }

    sections
}

// ============================================================================
// Rendering
// ============================================================================

/// Render sections to markdown: a heading line, then the section body (text,
/// bulleted items, 1-based numbered items, or a bolded highlight), then a
/// blank line. Input order is preserved.
pub fn render_markdown(sections: &[InsightSection]) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str("## ");
        out.push_str(&section.title);
        out.push('\n');

        match section.kind {
            SectionKind::Summary => {
                if let Some(text) = &section.text {
                    out.push_str(text);
                    out.push('\n');
                }
            }
            SectionKind::List => {
                for item in section.items.as_deref().unwrap_or_default() {
                    out.push_str("- ");
                    out.push_str(item);
                    out.push('\n');
                }
            }
            SectionKind::NumberedList => {
                for (i, item) in section.items.as_deref().unwrap_or_default().iter().enumerate() {
                    out.push_str(&format!("{}. {}\n", i + 1, item));
                }
            }
            SectionKind::Highlight => {
                if let Some(highlight) = &section.highlight {
                    out.push_str("**");
                    out.push_str(highlight);
                    out.push_str("**\n");
                }
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spending_analysis_classification_and_order() {
        let raw = json!({
            "healthScore": 80,
            "topCategories": [
                {"category": "Food", "amount": 4500.0, "percent": 32.1},
                {"category": "Transport", "amount": 2100.0}
            ],
            "summary": {"totalIncome": 50000.0, "totalExpenses": 14000.0, "savingsRate": 72.0},
            "actionItems": ["Cut delivery orders"],
            "alerts": ["Food spend up 40% month over month"],
            "keyInsight": "Savings rate is excellent"
        })
        .to_string();

        let normalized = normalize_response(&raw);
        let sections = normalized.sections.unwrap();
        assert!(matches!(
            normalized.structured_data,
            Some(StructuredData::SpendingAnalysis(_))
        ));

        assert_eq!(sections[0].id, "overview");
        assert_eq!(sections[0].kind, SectionKind::Summary);
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["overview", "top_categories", "action_items", "alerts", "key_takeaway"]
        );
    }

    #[test]
    fn test_tax_shape_wins_over_spending_when_both_match() {
        // Priority order is fixed: tips+regime beats healthScore+topCategories
        let value = json!({
            "tips": ["Max out 80C"],
            "regime": "old",
            "healthScore": 50,
            "topCategories": []
        });
        let data = classify(&value).unwrap();
        assert!(matches!(data, StructuredData::TaxTips(_)));
    }

    #[test]
    fn test_each_shape_classifies() {
        let cases = vec![
            (json!({"tips": [], "regime": "new"}), "tax"),
            (json!({"healthScore": 1, "topCategories": []}), "spending"),
            (
                json!({"needs": {"amount": 1}, "wants": {"amount": 1}, "savingsInvestments": {"amount": 1}}),
                "monthly",
            ),
            (json!({"weeklyTarget": 1, "dailyLimit": 1}), "weekly"),
            (
                json!({"portfolioValue": 1, "diversification": {"score": 50}}),
                "investment",
            ),
            (json!({"planScore": 1, "allocationReview": "ok"}), "planner"),
        ];
        for (value, label) in cases {
            let data = classify(&value);
            assert!(data.is_some(), "shape {} failed to classify", label);
            let expected = match label {
                "tax" => matches!(data, Some(StructuredData::TaxTips(_))),
                "spending" => matches!(data, Some(StructuredData::SpendingAnalysis(_))),
                "monthly" => matches!(data, Some(StructuredData::MonthlyBudget(_))),
                "weekly" => matches!(data, Some(StructuredData::WeeklyBudget(_))),
                "investment" => matches!(data, Some(StructuredData::InvestmentInsights(_))),
                "planner" => matches!(data, Some(StructuredData::PlannerRecommendation(_))),
                _ => false,
            };
            assert!(expected, "shape {} classified as the wrong variant", label);
        }
    }

    #[test]
    fn test_matched_shape_with_wrong_field_type_degrades() {
        // healthScore as a string fails typed decoding; raw text survives
        let raw = json!({"healthScore": "eighty", "topCategories": []}).to_string();
        let normalized = normalize_response(&raw);
        assert!(normalized.structured_data.is_none());
        assert!(normalized.sections.is_none());
        assert_eq!(normalized.content, raw);
    }

    #[test]
    fn test_legacy_sections_shape() {
        let raw = json!({
            "sections": [
                {"id": "s1", "title": "First", "type": "summary", "text": "hello"},
                {"id": "s2", "title": "Second", "type": "list", "items": ["a", "b"], "severity": "warning"},
                {"id": "bad", "title": "No type"},
                {"id": "s3", "title": "Third", "type": "highlight", "highlight": "watch this", "severity": "apocalyptic"}
            ]
        })
        .to_string();

        let normalized = normalize_response(&raw);
        assert!(normalized.structured_data.is_none());
        let sections = normalized.sections.unwrap();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[1].severity, Some(Severity::Warning));
        // Unknown severity drops, element survives
        assert_eq!(sections[2].id, "s3");
        assert_eq!(sections[2].severity, None);
    }

    #[test]
    fn test_unmatched_object_falls_back_to_raw_content() {
        let raw = json!({"greeting": "hello", "mood": "sunny"}).to_string();
        let normalized = normalize_response(&raw);
        assert!(normalized.structured_data.is_none());
        assert!(normalized.sections.is_none());
        assert_eq!(normalized.content, raw);
    }

    #[test]
    fn test_non_json_falls_back_to_raw_content() {
        let raw = "Everything looks fine, keep going!";
        let normalized = normalize_response(raw);
        assert_eq!(normalized.content, raw);
        assert!(normalized.sections.is_none());
    }

    #[test]
    fn test_render_markdown_numbering_and_order() {
        let sections = vec![
            InsightSection::summary("overview", "Overview", "All good."),
            InsightSection::numbered_list(
                "steps",
                "Steps",
                vec!["first".to_string(), "second".to_string(), "third".to_string()],
            ),
            InsightSection::list("notes", "Notes", vec!["a note".to_string()]),
            InsightSection::highlight("key", "Key", "remember this"),
        ];
        let md = render_markdown(&sections);
        let expected = "## Overview\nAll good.\n\n## Steps\n1. first\n2. second\n3. third\n\n## Notes\n- a note\n\n## Key\n**remember this**\n\n";
        assert_eq!(md, expected);
    }

    #[test]
    fn test_rendered_markdown_preserves_section_order() {
        // Heading order in the markdown mirrors the section order exactly
        let raw = json!({
            "weeklyTarget": 7000.0,
            "dailyLimit": 1000.0,
            "focusAreas": ["Groceries"],
            "tips": ["Cook at home"]
        })
        .to_string();
        let normalized = normalize_response(&raw);
        let content = normalized.content;
        let overview = content.find("## Overview").unwrap();
        let targets = content.find("## Weekly Targets").unwrap();
        let focus = content.find("## Focus Areas").unwrap();
        let tips = content.find("## Tips").unwrap();
        assert!(overview < targets && targets < focus && focus < tips);
    }
}
