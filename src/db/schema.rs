pub const SCHEMA: &str = r#"
-- one row per (store, key); deleted rows are kept as tombstones until synced
CREATE TABLE IF NOT EXISTS records (
    store TEXT NOT NULL,
    key TEXT NOT NULL,
    index_value TEXT,
    value TEXT,
    updated_at TEXT NOT NULL,
    dirty INTEGER NOT NULL DEFAULT 1,
    deleted INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (store, key)
);

CREATE INDEX IF NOT EXISTS idx_records_index ON records(store, index_value);
CREATE INDEX IF NOT EXISTS idx_records_dirty ON records(dirty);

-- sync bookkeeping (last pull cursor)
CREATE TABLE IF NOT EXISTS sync_state (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
