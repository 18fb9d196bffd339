use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no results for query")]
    NoResults,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
