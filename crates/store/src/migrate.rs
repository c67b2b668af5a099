/// Every migration file, in application order. Filenames are the tracking
/// key in `schema_migrations`; add new entries here, never edit an applied
/// one in place.
pub static MIGRATIONS: &[(&str, &str)] = &[("0001_init.sql", include_str!("../migrations/0001_init.sql"))];

pub const CREATE_TRACKING_TABLE_SQLITE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

pub const CREATE_TRACKING_TABLE_POSTGRES: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

/// Trivial syntactic translation from the sqlite-dialect migration source to
/// postgres: auto-increment and datetime spellings differ; everything else
/// (column types, constraints, indexes) is portable SQL. `DATETIME` becomes
/// `TIMESTAMPTZ` rather than bare `TIMESTAMP` so that `chrono::DateTime<Utc>`
/// binds against it directly on both backends.
pub fn translate_for_postgres(sql: &str) -> String {
    sql.replace("INTEGER PRIMARY KEY AUTOINCREMENT", "SERIAL PRIMARY KEY")
        .replace("DATETIME", "TIMESTAMPTZ")
}

/// Splits a migration file into individual statements on `;`, dropping
/// blank statements left by trailing separators or comment-only lines.
pub fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
