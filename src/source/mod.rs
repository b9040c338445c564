pub mod csv;
pub mod http;
#[cfg(test)]
pub(crate) mod mock_server;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ProviderInfoMode, SourceConfig};
use crate::dataset::normalize::normalize_json_rows;
use crate::dataset::{Ccn, Dataset, Table};
use crate::source::http::{is_transient_status, HttpFetcher, RetryPolicy};

/// Column the upstream `$where` filters on for the watch list.
pub const CCN_FILTER_COLUMN: &str = "federal_provider_number";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed building HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned {status}: {preview}")]
    Status {
        url: String,
        status: u16,
        preview: String,
    },
    #[error("GET {url} still failing after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("no CSV distribution listed for dataset {dataset_id}")]
    MissingCsvDistribution { dataset_id: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_transient_status)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Rows of `dataset` for the given facilities, normalized. `since` bounds
    /// datasets that carry an event date and is ignored by the others.
    async fn fetch(&self, dataset: Dataset, ccns: &[Ccn], since: Option<NaiveDate>)
        -> Result<Table>;
}

pub fn lookback_column(dataset: Dataset) -> Option<&'static str> {
    match dataset {
        Dataset::Penalties => Some("imposed_date"),
        Dataset::Deficiencies => Some("inspection_date"),
        _ => None,
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SoQL `$where` clause for a CCN list and an optional lower date bound.
pub fn build_where(dataset: Dataset, ccns: &[Ccn], since: Option<NaiveDate>) -> String {
    let list = ccns
        .iter()
        .map(|ccn| quote_literal(ccn.as_str()))
        .collect::<Vec<_>>()
        .join(",");
    let mut clause = format!("{CCN_FILTER_COLUMN} in ({list})");
    if let (Some(column), Some(since)) = (lookback_column(dataset), since) {
        clause.push_str(&format!(" AND {column} >= '{}'", since.format("%Y-%m-%d")));
    }
    clause
}

pub fn page_query(where_clause: &str, limit: u32, offset: u64) -> Vec<(String, String)> {
    vec![
        ("$select".to_string(), "*".to_string()),
        ("$where".to_string(), where_clause.to_string()),
        ("$limit".to_string(), limit.to_string()),
        ("$offset".to_string(), offset.to_string()),
    ]
}

pub struct SocrataSource {
    http: HttpFetcher,
    config: SourceConfig,
}

impl SocrataSource {
    pub fn new(config: &SourceConfig, app_token: Option<&str>) -> Result<Self> {
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            min_backoff: Duration::from_secs(config.backoff_min_secs),
            max_backoff: Duration::from_secs(config.backoff_max_secs.max(config.backoff_min_secs)),
        };
        let http = HttpFetcher::new(
            Duration::from_secs(config.request_timeout_secs),
            retry,
            app_token.map(str::to_string),
        )?;
        if app_token.is_none() {
            debug!("no Socrata app token configured; requests are rate limited more aggressively");
        }
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn resource_url(&self, dataset_id: &str) -> String {
        format!("{}/{}.json", self.config.base_url.trim_end_matches('/'), dataset_id)
    }

    async fn fetch_rows(&self, dataset_id: &str, where_clause: &str) -> Result<Vec<Value>> {
        let url = self.resource_url(dataset_id);
        let limit = self.config.page_limit.max(1);
        let mut offset = 0u64;
        let mut rows = Vec::new();
        loop {
            let page = self
                .http
                .get_json(&url, &page_query(where_clause, limit, offset))
                .await?;
            let Value::Array(page) = page else {
                return Err(FetchError::Decode {
                    url,
                    reason: "expected a JSON array of rows".to_string(),
                }
                .into());
            };
            let page_len = page.len();
            rows.extend(page);
            if page_len < limit as usize {
                break;
            }
            offset += u64::from(limit);
            tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
        }
        Ok(rows)
    }
}

#[async_trait]
impl DatasetSource for SocrataSource {
    async fn fetch(
        &self,
        dataset: Dataset,
        ccns: &[Ccn],
        since: Option<NaiveDate>,
    ) -> Result<Table> {
        if ccns.is_empty() {
            return Ok(Table::default());
        }
        let dataset_id = self.config.datasets.id_for(dataset);
        if dataset == Dataset::ProviderInfo && self.config.provider_info_mode == ProviderInfoMode::Csv {
            return csv::fetch_provider_info_csv(
                &self.http,
                &self.config.metastore_url,
                dataset_id,
                ccns,
            )
            .await;
        }

        let where_clause = build_where(dataset, ccns, since);
        let rows = self
            .fetch_rows(dataset_id, &where_clause)
            .await
            .with_context(|| format!("failed fetching {dataset} ({dataset_id})"))?;
        let table = normalize_json_rows(dataset, &rows);
        info!("{dataset}: fetched {} rows, kept {}", rows.len(), table.len());
        Ok(table)
    }
}
