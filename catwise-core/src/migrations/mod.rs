//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary with include_str! and applied in
//! order by name.

/// Creates the sys_migrations table; always applied first
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";

/// All migrations, embedded at compile time.
/// Format: (filename, sql_content)
///
/// When adding a migration, create `NNN_description.sql` and append it here.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_classification_schema.sql", include_str!("001_classification_schema.sql")),
];
