use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::dataset::normalize::{normalize_rows, raw_row_from_csv, resolve_ccn};
use crate::dataset::{Ccn, Dataset, Table};
use crate::source::http::HttpFetcher;
use crate::source::FetchError;

const CSV_MEDIA_TYPE: &str = "text/csv";

/// Download URL of the first `text/csv` distribution in metastore metadata.
pub fn csv_download_url(metadata: &Value) -> Option<String> {
    metadata
        .get("distribution")?
        .as_array()?
        .iter()
        .filter(|dist| dist.get("mediaType").and_then(Value::as_str) == Some(CSV_MEDIA_TYPE))
        .find_map(|dist| {
            dist.get("downloadURL")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
        })
}

pub fn parse_provider_csv(body: &str, ccns: &[Ccn]) -> Result<Table> {
    let wanted: BTreeSet<&Ccn> = ccns.iter().collect();
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .context("provider CSV has no header row")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed provider CSV row")?;
        let row = raw_row_from_csv(&headers, &record);
        if resolve_ccn(&row).is_some_and(|ccn| wanted.contains(&ccn)) {
            rows.push(row);
        }
    }
    Ok(normalize_rows(Dataset::ProviderInfo, rows))
}

pub async fn fetch_provider_info_csv(
    http: &HttpFetcher,
    metastore_url: &str,
    dataset_id: &str,
    ccns: &[Ccn],
) -> Result<Table> {
    let metadata_url = format!("{}/{}", metastore_url.trim_end_matches('/'), dataset_id);
    let metadata = http
        .get_json(&metadata_url, &[])
        .await
        .with_context(|| format!("failed fetching metadata for {dataset_id}"))?;
    let download_url = csv_download_url(&metadata).ok_or_else(|| FetchError::MissingCsvDistribution {
        dataset_id: dataset_id.to_string(),
    })?;
    info!("downloading provider info CSV from {download_url}");
    let body = http
        .get_text(&download_url, &[])
        .await
        .with_context(|| format!("failed downloading {download_url}"))?;
    let table = parse_provider_csv(&body, ccns)?;
    info!("{}: kept {} rows from CSV", Dataset::ProviderInfo, table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn picks_first_csv_distribution() {
        let metadata = json!({
            "distribution": [
                { "mediaType": "application/json", "downloadURL": "https://x/data.json" },
                { "mediaType": "text/csv", "downloadURL": "" },
                { "mediaType": "text/csv", "downloadURL": "https://x/NH_ProviderInfo.csv" }
            ]
        });
        assert_eq!(
            csv_download_url(&metadata).as_deref(),
            Some("https://x/NH_ProviderInfo.csv")
        );
        assert_eq!(csv_download_url(&json!({ "distribution": [] })), None);
        assert_eq!(csv_download_url(&json!({})), None);
    }

    #[test]
    fn filters_csv_rows_to_watched_facilities() {
        let body = "\
CMS Certification Number (CCN),Provider Name,Provider City,Provider State,Overall Rating
12345,Maple Grove,Springfield,IL,4
999999,Elsewhere,Nowhere,TX,2
";
        let ccn: Ccn = "012345".parse().expect("valid ccn");
        let table = parse_provider_csv(body, &[ccn.clone()]).expect("parse");
        assert_eq!(table.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.ccn, ccn);
        assert_eq!(row.number("overall_rating"), Some(4.0));
        assert_eq!(row.text("provider_name").as_deref(), Some("Maple Grove"));
    }
}
