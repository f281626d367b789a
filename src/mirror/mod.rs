use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orders::order::Order;

pub mod credentials;
pub mod sheets;

pub use sheets::{MirrorConfig, SheetsMirror};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential file {} not found", path.display())]
    MissingCredentials { path: PathBuf },
    #[error("failed to read credential file {}: {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("credential file {} is malformed: {source}", path.display())]
    Malformed { path: PathBuf, source: serde_json::Error },
    #[error("invalid service account key: {0}")]
    InvalidKey(#[from] jsonwebtoken::errors::Error),
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("credentials rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("spreadsheet {0:?} not found")]
    SpreadsheetNotFound(String),
    #[error("spreadsheet {0:?} has no worksheet")]
    NoWorksheet(String),
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
    #[error("amount {0} cannot be sent as a number")]
    InvalidAmount(Decimal),
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Remote(#[from] RemoteError),
}

/// Copies committed orders to a remote table. Implementations never retry;
/// a failed call leaves the remote table one row behind the ledger.
pub trait Replicate {
    fn replicate(&mut self, order: &Order) -> Result<(), MirrorError>;
}

/// What happened to the remote copy of a committed order.
#[derive(Debug)]
pub enum MirrorStatus {
    Replicated,
    /// No mirror is configured.
    Skipped,
    Failed(MirrorError),
}

impl MirrorStatus {
    pub fn is_replicated(&self) -> bool {
        matches!(self, MirrorStatus::Replicated)
    }
}
