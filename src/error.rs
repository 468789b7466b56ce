use std::path::PathBuf;

/// Failures of the layers around the evaluator: loading snapshots and
/// widgets, talking to Postgres, importing CSV files.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid CSV row: {0}")]
    Csv(#[from] csv::Error),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
