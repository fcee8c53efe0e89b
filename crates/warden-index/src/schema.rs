//! SQLite schema for the file index

pub const SCHEMA_VERSION: u32 = 1;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS file_records (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    scope_id               TEXT    NOT NULL,
    relative_path          TEXT    NOT NULL,
    content_hash           TEXT    NOT NULL,
    size_bytes             INTEGER NOT NULL,
    file_type              TEXT    NOT NULL,
    verified               INTEGER NOT NULL DEFAULT 0,
    integrity_check_failed INTEGER NOT NULL DEFAULT 0,
    download_url           TEXT,
    last_synced_at         TEXT    NOT NULL,
    UNIQUE (scope_id, relative_path)
);

CREATE INDEX IF NOT EXISTS idx_file_records_scope ON file_records (scope_id);
"#;
