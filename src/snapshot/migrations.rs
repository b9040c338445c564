pub const BASE_MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_tables (
    snapshot_date TEXT NOT NULL,
    dataset TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    digest TEXT NOT NULL,
    table_json TEXT NOT NULL,
    written_at TEXT NOT NULL,
    PRIMARY KEY (snapshot_date, dataset)
);
CREATE INDEX IF NOT EXISTS idx_snapshot_tables_date
    ON snapshot_tables(snapshot_date DESC);
"#;
