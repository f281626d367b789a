use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use log::{debug, info};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook};
use tempfile::NamedTempFile;

use super::{check_header, parse_timestamp, LedgerStore, StorageError, HEADER};
use crate::orders::order::{parse_amount, Order};

const SHEET_NAME: &str = "Orders";
const COLUMN_WIDTHS: [f64; 5] = [20.0, 24.0, 24.0, 40.0, 12.0];

/// Ledger kept as an Excel workbook, first worksheet only.
///
/// The format has no append path, so every append loads the whole table and
/// writes a fresh workbook. The new file is written next to the old one and
/// renamed over it, which leaves the previous ledger intact if the write fails.
///
/// Amounts are stored as numeric cells, i.e. `f64`. They reload as equal
/// values only up to about 15 significant digits: `1000000000000000.01`
/// comes back as `1000000000000000`, and the written scale is not kept
/// (`12.50` comes back as `12.5`). Use the CSV ledger for exact amounts.
#[derive(Debug)]
pub struct XlsxLedger {
    path: PathBuf,
}

impl XlsxLedger {
    pub fn new(path: impl Into<PathBuf>) -> XlsxLedger {
        XlsxLedger { path: path.into() }
    }

    fn write_all(&self, orders: &[Order]) -> Result<(), StorageError> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for (col, (title, width)) in HEADER.iter().zip(COLUMN_WIDTHS).enumerate() {
            let col = col as u16;
            worksheet.set_column_width(col, width)?;
            worksheet.write_string_with_format(0, col, *title, &header_format)?;
        }

        for (index, order) in orders.iter().enumerate() {
            let row = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let amount = order.amount().to_f64().ok_or_else(|| StorageError::InvalidAmount {
                row: index + 1,
                value: order.amount().to_string(),
            })?;

            worksheet.write_string(row, 0, order.formatted_timestamp())?;
            worksheet.write_string(row, 1, order.customer_name())?;
            worksheet.write_string(row, 2, order.contact())?;
            worksheet.write_string(row, 3, order.order_details())?;
            worksheet.write_number(row, 4, amount)?;
        }

        let buffer = workbook.save_to_buffer()?;
        let mut file = NamedTempFile::new_in(self.directory())?;
        file.write_all(&buffer)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| err.error)?;

        Ok(())
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl LedgerStore for XlsxLedger {
    fn ensure_store_exists(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            return Ok(());
        }

        self.write_all(&[])?;
        info!("created ledger, path={}", self.path.display());

        Ok(())
    }

    fn append(&mut self, order: &Order) -> Result<(), StorageError> {
        let mut orders = self.load_all()?;
        orders.push(order.clone());
        self.write_all(&orders)?;
        info!(
            "appended order, path={}, customer={}, amount={}, rows={}",
            self.path.display(),
            order.customer_name(),
            order.amount(),
            orders.len()
        );

        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Order>, StorageError> {
        if !self.path.exists() {
            debug!("ledger not found, path={}", self.path.display());
            return Ok(Vec::new());
        }

        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| StorageError::MissingSheet {
                path: self.path.clone(),
            })??;

        let mut rows = range.rows();
        let header: Vec<String> = rows.next().map(|cells| cells.iter().map(Data::to_string).collect()).unwrap_or_default();
        check_header(&self.path, header.iter().map(String::as_str))?;

        let mut orders = Vec::new();
        for (index, cells) in rows.enumerate() {
            let row = index + 1;
            let cell = |col: usize| cells.get(col).unwrap_or(&Data::Empty);
            if (0..HEADER.len()).all(|col| matches!(cell(col), Data::Empty)) {
                continue;
            }

            orders.push(Order::new(
                read_timestamp(cell(0), row)?,
                read_text(cell(1), row, HEADER[1])?,
                read_text(cell(2), row, HEADER[2])?,
                read_text(cell(3), row, HEADER[3])?,
                read_amount(cell(4), row)?,
            ));
        }

        Ok(orders)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn read_timestamp(cell: &Data, row: usize) -> Result<chrono::NaiveDateTime, StorageError> {
    match cell {
        Data::String(value) | Data::DateTimeIso(value) => parse_timestamp(value, row),
        other => Err(StorageError::InvalidTimestamp {
            row,
            value: other.to_string(),
        }),
    }
}

fn read_text(cell: &Data, row: usize, column: &'static str) -> Result<String, StorageError> {
    let value = match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        other => other.to_string(),
    };

    if value.is_empty() {
        return Err(StorageError::EmptyCell { row, column });
    }

    Ok(value)
}

fn read_amount(cell: &Data, row: usize) -> Result<Decimal, StorageError> {
    let invalid = || StorageError::InvalidAmount {
        row,
        value: cell.to_string(),
    };

    match cell {
        Data::Float(value) => Decimal::from_f64(*value).ok_or_else(invalid),
        Data::Int(value) => Ok(Decimal::from(*value)),
        Data::String(value) => parse_amount(value).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
