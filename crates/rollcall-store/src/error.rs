use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("service account key not found: {} (download it from the Firebase console)", .0.display())]
    CredentialsMissing(PathBuf),
    #[error("cannot read service account key {}: {source}", path.display())]
    CredentialsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid service account key {}: {source}", path.display())]
    CredentialsInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("signing token request: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("token exchange rejected ({status}): {body}")]
    TokenRejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("database URL not configured (set ROLLCALL_DATABASE_URL or [database] url)")]
    UrlMissing,
    #[error("invalid database URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid record key {0:?}")]
    InvalidKey(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database returned {status} for {path}: {body}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
        body: String,
    },
    #[error("malformed record at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
