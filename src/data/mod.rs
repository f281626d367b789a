use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use enum_dispatch::enum_dispatch;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orders::order::Order;
use crate::orders::TIMESTAMP_FORMAT;

pub mod csv_ledger;
pub mod xlsx_ledger;

pub use csv_ledger::CsvLedger;
pub use xlsx_ledger::XlsxLedger;

pub const HEADER: [&str; 5] = ["Timestamp", "Customer Name", "Contact", "Order Details", "Amount"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("xlsx read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),
    #[error("xlsx write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("{path} does not start with the order header, found {found:?}")]
    UnexpectedHeader { path: PathBuf, found: Vec<String> },
    #[error("{path} contains no worksheet")]
    MissingSheet { path: PathBuf },
    #[error("row {row}: invalid timestamp {value:?}")]
    InvalidTimestamp { row: usize, value: String },
    #[error("row {row}: invalid amount {value:?}")]
    InvalidAmount { row: usize, value: String },
    #[error("row {row}: column {column:?} is empty")]
    EmptyCell { row: usize, column: &'static str },
}

/// The local, append-only order table.
#[enum_dispatch]
pub trait LedgerStore {
    /// Creates the backing file with only the header row. No-op if it exists.
    fn ensure_store_exists(&self) -> Result<(), StorageError>;

    /// Adds `order` as the new last row.
    fn append(&mut self, order: &Order) -> Result<(), StorageError>;

    /// All orders in insertion order. Empty when the file does not exist.
    fn load_all(&self) -> Result<Vec<Order>, StorageError>;

    fn path(&self) -> &Path;
}

#[enum_dispatch(LedgerStore)]
#[derive(Debug)]
pub enum Ledger {
    CsvLedger,
    XlsxLedger,
}

impl Ledger {
    /// Picks the file format from the extension: `.xlsx` is a workbook,
    /// anything else is CSV.
    pub fn open(path: impl Into<PathBuf>) -> Ledger {
        let path = path.into();
        let is_xlsx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));

        debug!("opening ledger, path={}, xlsx={}", path.display(), is_xlsx);
        if is_xlsx {
            Ledger::XlsxLedger(XlsxLedger::new(path))
        } else {
            Ledger::CsvLedger(CsvLedger::new(path))
        }
    }
}

/// Row layout shared by the CSV ledger and the `list` export.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Customer Name")]
    pub customer_name: String,
    #[serde(rename = "Contact")]
    pub contact: String,
    #[serde(rename = "Order Details")]
    pub order_details: String,
    // as text so the written scale survives a reload
    #[serde(rename = "Amount", with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        OrderRow {
            timestamp: order.formatted_timestamp(),
            customer_name: order.customer_name().clone(),
            contact: order.contact().clone(),
            order_details: order.order_details().clone(),
            amount: order.amount(),
        }
    }
}

impl OrderRow {
    /// `row` is the 1-based data row number used in error messages.
    pub fn into_order(self, row: usize) -> Result<Order, StorageError> {
        let timestamp = parse_timestamp(&self.timestamp, row)?;
        for (column, value) in [
            (HEADER[1], &self.customer_name),
            (HEADER[2], &self.contact),
            (HEADER[3], &self.order_details),
        ] {
            if value.is_empty() {
                return Err(StorageError::EmptyCell { row, column });
            }
        }

        Ok(Order::new(
            timestamp,
            self.customer_name,
            self.contact,
            self.order_details,
            self.amount,
        ))
    }
}

pub(crate) fn parse_timestamp(value: &str, row: usize) -> Result<NaiveDateTime, StorageError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|_| StorageError::InvalidTimestamp {
        row,
        value: value.to_string(),
    })
}

pub(crate) fn check_header<'a>(
    path: &Path,
    found: impl IntoIterator<Item = &'a str>,
) -> Result<(), StorageError> {
    let found: Vec<String> = found.into_iter().map(|cell| cell.trim().to_string()).collect();
    if found.iter().map(String::as_str).eq(HEADER) {
        Ok(())
    } else {
        Err(StorageError::UnexpectedHeader {
            path: path.to_path_buf(),
            found,
        })
    }
}
