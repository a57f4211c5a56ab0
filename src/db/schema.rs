/// Schema for the durable key/value store.
///
/// Rows are scoped by backend origin so that two desks pointed at different
/// servers never see each other's tokens.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    origin TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (origin, key)
);
"#;
