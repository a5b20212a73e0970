use thiserror::Error;

/// Failures raised by the document and relational collaborators.
///
/// The engine never surfaces these to its callers; they end up as trace
/// stages next to a `None` value.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or initialized
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A query was rejected by the store
    #[error("query failed: {0}")]
    Query(String),

    /// A response could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
