use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::detect::Severity;

pub const APP_TOKEN_ENV: &str = "CMS_PDC_APP_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderInfoMode {
    #[default]
    Api,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_metastore_url")]
    pub metastore_url: String,
    #[serde(default)]
    pub app_token: String,
    #[serde(default)]
    pub provider_info_mode: ProviderInfoMode,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default)]
    pub datasets: DatasetIds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetIds {
    #[serde(default = "default_penalties_id")]
    pub penalties: String,
    #[serde(default = "default_deficiencies_id")]
    pub deficiencies: String,
    #[serde(default = "default_provider_info_id")]
    pub provider_info: String,
    #[serde(default = "default_snf_qrp_id")]
    pub snf_qrp: String,
    #[serde(default = "default_snf_vbp_id")]
    pub snf_vbp: String,
}

impl DatasetIds {
    pub fn id_for(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Penalties => &self.penalties,
            Dataset::Deficiencies => &self.deficiencies,
            Dataset::ProviderInfo => &self.provider_info,
            Dataset::SnfQrp => &self.snf_qrp,
            Dataset::SnfVbp => &self.snf_vbp,
        }
    }

    fn id_mut(&mut self, dataset: Dataset) -> &mut String {
        match dataset {
            Dataset::Penalties => &mut self.penalties,
            Dataset::Deficiencies => &mut self.deficiencies,
            Dataset::ProviderInfo => &mut self.provider_info,
            Dataset::SnfQrp => &mut self.snf_qrp,
            Dataset::SnfVbp => &mut self.snf_vbp,
        }
    }

    /// `CMS_DATASET_PROVIDER_INFO` and friends.
    pub fn env_var(dataset: Dataset) -> String {
        format!("CMS_DATASET_{}", dataset.as_slug().to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Fs,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_days")]
    pub default_days: u32,
    #[serde(default = "default_history_months")]
    pub history_months: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
    #[serde(default)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub snapshot_dir: Option<String>,
    pub output_dir: Option<String>,
    pub default_days: Option<u32>,
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/cms-watch/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.source.app_token.trim().is_empty() {
            if let Some(token) = lookup(APP_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
                self.source.app_token = token;
            }
        }
        for dataset in Dataset::ALL {
            if let Some(id) = lookup(&DatasetIds::env_var(dataset)).filter(|v| !v.trim().is_empty()) {
                *self.source.datasets.id_mut(dataset) = id.trim().to_string();
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.snapshot_dir {
            self.storage.snapshot_dir = dir;
        }
        if let Some(dir) = overrides.output_dir {
            self.output.dir = dir;
        }
        if let Some(days) = overrides.default_days {
            self.analysis.default_days = days;
        }
        if let Some(url) = overrides.webhook_url {
            self.alerts.webhook_url = url;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_snapshot_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.snapshot_dir)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        expand_tilde(&self.output.dir)
    }

    pub fn app_token(&self) -> Option<&str> {
        let token = self.source.app_token.trim();
        (!token.is_empty()).then_some(token)
    }

    pub fn default_template() -> String {
        let template = r#"[source]
base_url = "https://data.cms.gov/resource"
metastore_url = "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items"
# Falls back to the CMS_PDC_APP_TOKEN environment variable when empty.
app_token = ""
# "api" (paginated JSON) or "csv" (published download)
provider_info_mode = "api"
page_limit = 50000
page_delay_ms = 200
request_timeout_secs = 60
max_attempts = 5
backoff_min_secs = 1
backoff_max_secs = 30

[source.datasets]
penalties = "g6vv-u9sr"
deficiencies = "y2hd-3m6z"
provider_info = "4pq5-n9py"
snf_qrp = "v2vd-humh"
snf_vbp = "m2qk-2p5h"

[storage]
# "fs" or "sqlite"
backend = "fs"
snapshot_dir = "./cms_snapshots"
db_path = "~/.local/share/cms-watch/snapshots.db"

[output]
dir = "./reports"

[analysis]
default_days = 60
history_months = 6

[alerts]
webhook_url = ""
enable_stdout = true
min_severity = "warn"

[alerts.email]
enabled = false
smtp_host = ""
# STARTTLS submission port
smtp_port = 587
smtp_user = ""
smtp_password = ""
from = ""
to = []
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metastore_url: default_metastore_url(),
            app_token: String::new(),
            provider_info_mode: ProviderInfoMode::default(),
            page_limit: default_page_limit(),
            page_delay_ms: default_page_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_min_secs: default_backoff_min_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            datasets: DatasetIds::default(),
        }
    }
}

impl Default for DatasetIds {
    fn default() -> Self {
        Self {
            penalties: default_penalties_id(),
            deficiencies: default_deficiencies_id(),
            provider_info: default_provider_info_id(),
            snf_qrp: default_snf_qrp_id(),
            snf_vbp: default_snf_vbp_id(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            snapshot_dir: default_snapshot_dir(),
            db_path: default_db_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_days: default_days(),
            history_months: default_history_months(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            enable_stdout: default_enable_stdout(),
            min_severity: default_min_severity(),
            email: EmailConfig::default(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            from: String::new(),
            to: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://data.cms.gov/resource".to_string()
}

fn default_metastore_url() -> String {
    "https://data.cms.gov/provider-data/api/1/metastore/schemas/dataset/items".to_string()
}

fn default_page_limit() -> u32 {
    50_000
}

fn default_page_delay_ms() -> u64 {
    200
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_min_secs() -> u64 {
    1
}

fn default_backoff_max_secs() -> u64 {
    30
}

fn default_penalties_id() -> String {
    "g6vv-u9sr".to_string()
}

fn default_deficiencies_id() -> String {
    "y2hd-3m6z".to_string()
}

fn default_provider_info_id() -> String {
    "4pq5-n9py".to_string()
}

fn default_snf_qrp_id() -> String {
    "v2vd-humh".to_string()
}

fn default_snf_vbp_id() -> String {
    "m2qk-2p5h".to_string()
}

fn default_snapshot_dir() -> String {
    "./cms_snapshots".to_string()
}

fn default_db_path() -> String {
    "~/.local/share/cms-watch/snapshots.db".to_string()
}

fn default_output_dir() -> String {
    "./reports".to_string()
}

fn default_days() -> u32 {
    60
}

fn default_history_months() -> u32 {
    6
}

fn default_enable_stdout() -> bool {
    true
}

fn default_min_severity() -> Severity {
    Severity::Warn
}

fn default_smtp_port() -> u16 {
    587
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::default_template()).expect("template");
        let defaults = Config::default();
        assert_eq!(parsed.source.base_url, defaults.source.base_url);
        assert_eq!(parsed.source.page_limit, 50_000);
        assert_eq!(parsed.source.datasets.provider_info, "4pq5-n9py");
        assert_eq!(parsed.storage.backend, StorageBackend::Fs);
        assert_eq!(parsed.analysis.default_days, 60);
        assert_eq!(parsed.alerts.min_severity, Severity::Warn);
        assert!(!parsed.alerts.email.enabled);
        assert_eq!(parsed.alerts.email.smtp_port, 587);
    }

    #[test]
    fn email_section_parses() {
        let parsed: Config = toml::from_str(
            r#"
[alerts.email]
enabled = true
smtp_host = "smtp.example.org"
from = "watch@example.org"
to = ["ops@example.org", "admin@example.org"]
"#,
        )
        .expect("email config");
        let email = &parsed.alerts.email;
        assert!(email.enabled);
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.to.len(), 2);
        assert!(email.smtp_user.is_empty());
        assert!(parsed.alerts.enable_stdout);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[source]
provider_info_mode = "csv"

[storage]
backend = "sqlite"
"#,
        )
        .expect("partial config");
        assert_eq!(parsed.source.provider_info_mode, ProviderInfoMode::Csv);
        assert_eq!(parsed.source.max_attempts, 5);
        assert_eq!(parsed.storage.backend, StorageBackend::Sqlite);
        assert_eq!(parsed.output.dir, "./reports");
    }

    #[test]
    fn env_fills_token_and_dataset_ids() {
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            "CMS_PDC_APP_TOKEN" => Some("secret".to_string()),
            "CMS_DATASET_SNF_VBP" => Some(" abcd-1234 ".to_string()),
            _ => None,
        });
        assert_eq!(config.app_token(), Some("secret"));
        assert_eq!(config.source.datasets.id_for(Dataset::SnfVbp), "abcd-1234");
        assert_eq!(config.source.datasets.id_for(Dataset::Penalties), "g6vv-u9sr");
    }

    #[test]
    fn file_token_wins_over_env() {
        let mut config = Config::default();
        config.source.app_token = "from-file".to_string();
        config.apply_env_from(|_| Some("from-env".to_string()));
        assert_eq!(config.app_token(), Some("from-file"));
    }

    #[test]
    fn overrides_replace_values() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            output_dir: Some("/tmp/out".to_string()),
            default_days: Some(30),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.resolved_output_dir(), PathBuf::from("/tmp/out"));
        assert_eq!(config.analysis.default_days, 30);
    }
}
