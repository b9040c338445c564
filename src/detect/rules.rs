//! Ordered classification rules and the numeric helpers shared by the diff rules.

use serde::{Deserialize, Serialize};

/// Tolerance applied to threshold comparisons so exact boundary values trigger.
pub const EPSILON: f64 = 1e-9;

pub fn meets_threshold(value: f64, threshold: f64) -> bool {
    value >= threshold - EPSILON
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// One entry of an ordered rule list: the first matching predicate decides.
pub struct CategoryRule<C: 'static> {
    pub predicate: fn(&str) -> bool,
    pub category: C,
}

pub fn categorize<C: Copy>(rules: &[CategoryRule<C>], input: &str, fallback: C) -> C {
    rules
        .iter()
        .find(|rule| (rule.predicate)(input))
        .map(|rule| rule.category)
        .unwrap_or(fallback)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeSeverityTier {
    ImmediateJeopardy,
    ActualHarm,
    PotentialHarm,
    MinimalHarm,
    Unclassified,
}

fn is_immediate_jeopardy(code: &str) -> bool {
    matches!(code, "J" | "K" | "L")
}

fn is_actual_harm(code: &str) -> bool {
    matches!(code, "G" | "H" | "I")
}

fn is_potential_harm(code: &str) -> bool {
    matches!(code, "D" | "E" | "F")
}

fn is_minimal_harm(code: &str) -> bool {
    matches!(code, "A" | "B" | "C")
}

pub const SCOPE_SEVERITY_RULES: &[CategoryRule<ScopeSeverityTier>] = &[
    CategoryRule {
        predicate: is_immediate_jeopardy,
        category: ScopeSeverityTier::ImmediateJeopardy,
    },
    CategoryRule {
        predicate: is_actual_harm,
        category: ScopeSeverityTier::ActualHarm,
    },
    CategoryRule {
        predicate: is_potential_harm,
        category: ScopeSeverityTier::PotentialHarm,
    },
    CategoryRule {
        predicate: is_minimal_harm,
        category: ScopeSeverityTier::MinimalHarm,
    },
];

pub fn classify_scope_severity(code: &str) -> ScopeSeverityTier {
    let normalized = code.trim().to_ascii_uppercase();
    categorize(
        SCOPE_SEVERITY_RULES,
        &normalized,
        ScopeSeverityTier::Unclassified,
    )
}

/// Integers without decimals, everything else to at most three places.
pub fn format_value(value: f64) -> String {
    if approx_eq(value, value.round()) {
        return format!("{:.0}", value.round());
    }
    let fixed = format!("{value:.3}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_value).unwrap_or_else(|| "n/a".to_string())
}

/// Whole dollars with thousands separators: `12500.4` → `"12,500"`.
pub fn format_dollars(amount: f64) -> String {
    let whole = amount.round().abs() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0.0 {
        format!("-{out}")
    } else {
        out
    }
}
