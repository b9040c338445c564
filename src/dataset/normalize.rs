//! Schema-drift tolerant typing of upstream rows.
//!
//! Upstream column names drift between releases and between the JSON API and
//! the CSV download. Rows are reduced to snake_case keys, renamed through an
//! ordered alias list, then typed per dataset. Anything that fails to parse
//! becomes NA instead of an error.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::dataset::schema::{Ccn, Dataset, FieldValue, Record, Table};

/// Columns that may carry the facility id, in priority order.
pub const CCN_COLUMNS: &[&str] = &[
    "federal_provider_number",
    "ccn",
    "provider_number",
    "cms_certification_number_ccn",
];

pub struct ColumnAlias {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

/// First alias present wins; an existing canonical column is never replaced.
pub const COLUMN_ALIASES: &[ColumnAlias] = &[
    ColumnAlias {
        canonical: "city",
        aliases: &["city_town", "provider_city"],
    },
    ColumnAlias {
        canonical: "state",
        aliases: &["provider_state"],
    },
    ColumnAlias {
        canonical: "month_year",
        aliases: &["processing_date"],
    },
    ColumnAlias {
        canonical: "quality_measures_rating",
        aliases: &["qm_rating"],
    },
    ColumnAlias {
        canonical: "total_nurse_staffing_hours_per_resident_per_day",
        aliases: &["reported_total_nurse_staffing_hours_per_resident_per_day"],
    },
    ColumnAlias {
        canonical: "rn_staffing_hours_per_resident_per_day",
        aliases: &["reported_rn_staffing_hours_per_resident_per_day"],
    },
    ColumnAlias {
        canonical: "weekend_total_nurse_staff_hours_per_resident_per_day",
        aliases: &["total_number_of_nurse_staff_hours_per_resident_per_day_on_the_weekend"],
    },
    ColumnAlias {
        canonical: "rn_turnover",
        aliases: &["registered_nurse_turnover"],
    },
    ColumnAlias {
        canonical: "total_nurse_staff_turnover",
        aliases: &["total_nursing_staff_turnover"],
    },
    ColumnAlias {
        canonical: "imposed_date",
        aliases: &["penalty_date"],
    },
    ColumnAlias {
        canonical: "civil_money_penalty_amount",
        aliases: &["fine_amount"],
    },
    ColumnAlias {
        canonical: "dpna_start_date",
        aliases: &["payment_denial_start_date"],
    },
    ColumnAlias {
        canonical: "deficiency_tag",
        aliases: &["deficiency_tag_number", "tag"],
    },
    ColumnAlias {
        canonical: "inspection_date",
        aliases: &["survey_date"],
    },
    ColumnAlias {
        canonical: "scope_and_severity",
        aliases: &["scope_severity_code", "scope_severity"],
    },
    ColumnAlias {
        canonical: "incentive_payment_multiplier",
        aliases: &["snf_vbp_incentive_payment_multiplier"],
    },
];

#[derive(Debug, Clone, Copy)]
pub struct DatasetSchema {
    pub date_columns: &'static [&'static str],
    pub numeric_columns: &'static [&'static str],
    pub numeric_suffixes: &'static [&'static str],
}

pub fn schema_for(dataset: Dataset) -> DatasetSchema {
    match dataset {
        Dataset::Penalties => DatasetSchema {
            date_columns: &[
                "imposed_date",
                "collection_ended_date",
                "dpna_start_date",
                "dpna_end_date",
            ],
            numeric_columns: &["civil_money_penalty_amount"],
            numeric_suffixes: &[],
        },
        Dataset::Deficiencies => DatasetSchema {
            date_columns: &["inspection_date"],
            numeric_columns: &[],
            numeric_suffixes: &[],
        },
        Dataset::ProviderInfo => DatasetSchema {
            date_columns: &["month_year"],
            numeric_columns: &[
                "overall_rating",
                "staffing_rating",
                "quality_measures_rating",
                "health_inspection_rating",
                "total_nurse_staffing_hours_per_resident_per_day",
                "rn_staffing_hours_per_resident_per_day",
                "weekend_total_nurse_staff_hours_per_resident_per_day",
                "rn_turnover",
                "total_nurse_staff_turnover",
                "administrator_turnover",
            ],
            numeric_suffixes: &[],
        },
        Dataset::SnfQrp => DatasetSchema {
            date_columns: &[
                "as_of_date",
                "reporting_period_start_date",
                "reporting_period_end_date",
            ],
            numeric_columns: &[],
            numeric_suffixes: &["_rate", "_ratio", "_score", "_percent"],
        },
        Dataset::SnfVbp => DatasetSchema {
            date_columns: &[],
            numeric_columns: &[
                "incentive_payment_multiplier",
                "total_performance_score",
                "achievement_score",
                "improvement_score",
                "rank",
                "fiscal_year",
            ],
            numeric_suffixes: &[],
        },
    }
}

impl DatasetSchema {
    fn is_date(&self, column: &str) -> bool {
        self.date_columns.contains(&column)
    }

    fn is_numeric(&self, column: &str) -> bool {
        self.numeric_columns.contains(&column)
            || self
                .numeric_suffixes
                .iter()
                .any(|suffix| column.ends_with(suffix))
    }
}

/// `"CMS Certification Number (CCN)"` → `"cms_certification_number_ccn"`.
pub fn snake_case_column(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let sanitized: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '%' | '$' | '_'))
        .collect();
    if sanitized.is_empty() {
        return None;
    }
    sanitized.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.len() >= 10 {
        if let Some(head) = trimmed.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    for format in ["%m/%d/%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn raw_row_from_json(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter_map(|(k, v)| value_to_string(v).map(|s| (snake_case_column(k), s)))
        .collect()
}

pub fn raw_row_from_csv(headers: &[String], values: &csv::StringRecord) -> BTreeMap<String, String> {
    headers
        .iter()
        .zip(values.iter())
        .map(|(h, v)| (snake_case_column(h), v.to_string()))
        .collect()
}

fn apply_aliases(row: &mut BTreeMap<String, String>) {
    for rule in COLUMN_ALIASES {
        if row.contains_key(rule.canonical) {
            continue;
        }
        let Some(alias) = rule.aliases.iter().find(|a| row.contains_key(**a)) else {
            continue;
        };
        if let Some(value) = row.remove(*alias) {
            row.insert(rule.canonical.to_string(), value);
        }
    }
}

pub fn resolve_ccn(row: &BTreeMap<String, String>) -> Option<Ccn> {
    let raw = CCN_COLUMNS.iter().find_map(|col| row.get(*col))?;
    match raw.parse::<Ccn>() {
        Ok(ccn) => Some(ccn),
        Err(err) => {
            debug!("dropping row with unusable CCN {raw:?}: {err}");
            None
        }
    }
}

/// Types a single raw row; `None` when no usable CCN is present.
pub fn normalize_row(dataset: Dataset, mut row: BTreeMap<String, String>) -> Option<Record> {
    let ccn = resolve_ccn(&row)?;
    apply_aliases(&mut row);
    let schema = schema_for(dataset);

    let mut record = Record::new(ccn);
    for (column, raw) in row {
        if CCN_COLUMNS.contains(&column.as_str()) {
            continue;
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = if schema.is_date(&column) {
            parse_date(trimmed).map(FieldValue::Date)
        } else if schema.is_numeric(&column) {
            parse_number(trimmed).map(FieldValue::Number)
        } else {
            Some(FieldValue::Text(trimmed.to_string()))
        };
        match value {
            Some(value) => {
                record.fields.insert(column, value);
            }
            None => debug!("{dataset}: treating unparsable {column}={trimmed:?} as NA"),
        }
    }
    Some(record)
}

pub fn normalize_rows(
    dataset: Dataset,
    rows: impl IntoIterator<Item = BTreeMap<String, String>>,
) -> Table {
    let mut out = Vec::new();
    let mut dropped = 0usize;
    for row in rows {
        match normalize_row(dataset, row) {
            Some(record) => out.push(record),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("{dataset}: dropped {dropped} rows without a recognizable CCN column");
    }
    Table::new(out)
}

pub fn normalize_json_rows(dataset: Dataset, rows: &[Value]) -> Table {
    normalize_rows(
        dataset,
        rows.iter()
            .filter_map(Value::as_object)
            .map(raw_row_from_json),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snake_cases_display_headers() {
        assert_eq!(
            snake_case_column("CMS Certification Number (CCN)"),
            "cms_certification_number_ccn"
        );
        assert_eq!(snake_case_column("City/Town"), "city_town");
        assert_eq!(snake_case_column("overall_rating"), "overall_rating");
    }

    #[test]
    fn parses_loose_numbers_and_dates() {
        assert_eq!(parse_number("$12,500"), Some(12500.0));
        assert_eq!(parse_number("45.5%"), Some(45.5));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7);
        assert_eq!(parse_date("2024-03-07T00:00:00.000"), expected);
        assert_eq!(parse_date("03/07/2024"), expected);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn normalizes_socrata_rows_with_drifted_columns() {
        let rows = vec![json!({
            "federal_provider_number": "55682",
            "provider_name": "Maple Grove",
            "provider_city": "Austin",
            "overall_rating": "4",
            "staffing_rating": "not rated",
            "processing_date": "2024-06-01T00:00:00.000"
        })];
        let table = normalize_json_rows(Dataset::ProviderInfo, &rows);
        assert_eq!(table.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.ccn.as_str(), "055682");
        assert_eq!(row.number("overall_rating"), Some(4.0));
        assert!(!row.has("staffing_rating"));
        assert_eq!(row.text("city").as_deref(), Some("Austin"));
        assert_eq!(row.date("month_year"), NaiveDate::from_ymd_opt(2024, 6, 1));
    }

    #[test]
    fn drops_rows_without_ccn() {
        let rows = vec![json!({"provider_name": "Nowhere"}), json!("not an object")];
        let table = normalize_json_rows(Dataset::ProviderInfo, &rows);
        assert!(table.is_empty());
    }

    #[test]
    fn qrp_measures_are_typed_by_suffix() {
        let rows = vec![json!({
            "ccn": "012345",
            "discharge_to_community_rate": "0.51",
            "measure_footnote": "9"
        })];
        let table = normalize_json_rows(Dataset::SnfQrp, &rows);
        let row = &table.rows[0];
        assert_eq!(
            row.get("discharge_to_community_rate"),
            Some(&FieldValue::Number(0.51))
        );
        assert_eq!(
            row.get("measure_footnote"),
            Some(&FieldValue::Text("9".to_string()))
        );
    }
}
