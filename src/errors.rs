use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure the calculators or the map session can surface.
/// None of these are fatal; the UI reports them and the session
/// stays usable.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("enter at least 3 of the 4 slope values")]
    InsufficientInputs,
    #[error("enter a value to convert")]
    NoInputProvided,
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("map credentials response carried neither a client id nor a subscription key")]
    CredentialsUnavailable,
    #[error("failed to load map resource: {0}")]
    ResourceLoadFailed(String),
    #[error("click at least 2 points to measure")]
    InsufficientPoints,
    #[error("draw a polygon or rectangle first")]
    NoShapeToExport,
    #[error("export failed: {0}")]
    ExportFailed(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
