/// Database connection settings and table creation
pub mod database;

/// Built-in and TOML-provided category taxonomy used for seeding
pub mod categories;
