use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::normalize::{parse_date, parse_number};

pub const CCN_WIDTH: usize = 6;

/// CMS certification number, normalized to six zero-padded characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ccn(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CcnParseError {
    #[error("empty CCN")]
    Empty,
    #[error("CCN {0:?} is longer than 6 characters")]
    TooLong(String),
    #[error("CCN {0:?} contains non-alphanumeric characters")]
    InvalidCharacter(String),
}

impl Ccn {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Ccn {
    type Err = CcnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CcnParseError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CcnParseError::InvalidCharacter(trimmed.to_string()));
        }
        if trimmed.len() > CCN_WIDTH {
            return Err(CcnParseError::TooLong(trimmed.to_string()));
        }
        Ok(Self(format!(
            "{:0>width$}",
            trimmed.to_ascii_uppercase(),
            width = CCN_WIDTH
        )))
    }
}

impl TryFrom<String> for Ccn {
    type Error = CcnParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ccn> for String {
    fn from(value: Ccn) -> Self {
        value.0
    }
}

impl Display for Ccn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Penalties,
    Deficiencies,
    ProviderInfo,
    SnfQrp,
    SnfVbp,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::Penalties,
        Dataset::Deficiencies,
        Dataset::ProviderInfo,
        Dataset::SnfQrp,
        Dataset::SnfVbp,
    ];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Penalties => "penalties",
            Self::Deficiencies => "deficiencies",
            Self::ProviderInfo => "provider_info",
            Self::SnfQrp => "snf_qrp",
            Self::SnfVbp => "snf_vbp",
        }
    }

    /// Whether the upstream query is bounded by the look-back window.
    pub fn uses_lookback(&self) -> bool {
        matches!(self, Self::Penalties | Self::Deficiencies)
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Penalties => "Penalties",
            Self::Deficiencies => "Health Deficiencies",
            Self::ProviderInfo => "Provider Info",
            Self::SnfQrp => "SNF QRP",
            Self::SnfVbp => "SNF VBP",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Error)]
#[error("unknown dataset: {0}")]
pub struct DatasetParseError(pub String);

impl FromStr for Dataset {
    type Err = DatasetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "penalties" => Ok(Self::Penalties),
            "deficiencies" | "health_deficiencies" => Ok(Self::Deficiencies),
            "provider_info" | "provider" => Ok(Self::ProviderInfo),
            "snf_qrp" | "qrp" => Ok(Self::SnfQrp),
            "snf_vbp" | "vbp" => Ok(Self::SnfVbp),
            _ => Err(DatasetParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::Number(_) | Self::Date(_) => None,
            Self::Text(raw) => parse_number(raw),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Number(_) => None,
            Self::Text(raw) => parse_date(raw),
        }
    }

    /// Stable rendering used when building natural keys.
    pub fn key_repr(&self) -> String {
        match self {
            Self::Number(v) => format!("{v}"),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key_repr())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub ccn: Ccn,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(ccn: Ccn) -> Self {
        Self {
            ccn,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_number(self, name: impl Into<String>, value: f64) -> Self {
        self.with(name, FieldValue::Number(value))
    }

    pub fn with_date(self, name: impl Into<String>, value: NaiveDate) -> Self {
        self.with(name, FieldValue::Date(value))
    }

    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, FieldValue::Text(value.into()))
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_number)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(FieldValue::as_date)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        let value = self.get(name)?.key_repr();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Joins the given columns into a `|`-separated key; NA renders empty.
    pub fn natural_key(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|col| self.get(col).map(FieldValue::key_repr).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Table {
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn for_ccn<'a>(&'a self, ccn: &Ccn) -> Vec<&'a Record> {
        self.rows.iter().filter(|row| &row.ccn == ccn).collect()
    }

    pub fn ccns(&self) -> BTreeSet<Ccn> {
        self.rows.iter().map(|row| row.ccn.clone()).collect()
    }
}

static EMPTY_TABLE: Table = Table { rows: Vec::new() };

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub date: NaiveDate,
    tables: BTreeMap<Dataset, Table>,
}

impl Snapshot {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, dataset: Dataset, table: Table) -> Self {
        self.tables.insert(dataset, table);
        self
    }

    pub fn insert(&mut self, dataset: Dataset, table: Table) {
        self.tables.insert(dataset, table);
    }

    /// Missing datasets read as an empty table.
    pub fn table(&self, dataset: Dataset) -> &Table {
        self.tables.get(&dataset).unwrap_or(&EMPTY_TABLE)
    }

    /// Every dataset in processing order, empty ones included.
    pub fn tables(&self) -> impl Iterator<Item = (Dataset, &Table)> + '_ {
        Dataset::ALL.into_iter().map(|ds| (ds, self.table(ds)))
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(Table::len).sum()
    }
}

// An absent table and an empty one are the same snapshot.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date && self.tables().eq(other.tables())
    }
}
