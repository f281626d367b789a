use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{check_header, LedgerStore, OrderRow, StorageError, HEADER};
use crate::orders::order::Order;

/// Ledger kept as a CSV file. Appends write a single row at the end of the
/// file instead of rewriting it.
#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> CsvLedger {
        CsvLedger { path: path.into() }
    }

    fn reader(&self) -> Result<csv::Reader<File>, StorageError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.path)?;
        check_header(&self.path, reader.headers()?.iter())?;

        Ok(reader)
    }
}

impl LedgerStore for CsvLedger {
    fn ensure_store_exists(&self) -> Result<(), StorageError> {
        // create_new keeps an existing file untouched
        let file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        info!("created ledger, path={}", self.path.display());

        Ok(())
    }

    fn append(&mut self, order: &Order) -> Result<(), StorageError> {
        self.ensure_store_exists()?;
        // Validates the header before anything is written.
        self.reader()?;

        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        if !ends_with_newline(&mut file)? {
            debug!("ledger lacks a trailing newline, path={}", self.path.display());
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(OrderRow::from(order))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        info!(
            "appended order, path={}, customer={}, amount={}",
            self.path.display(),
            order.customer_name(),
            order.amount()
        );

        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Order>, StorageError> {
        if !self.path.exists() {
            debug!("ledger not found, path={}", self.path.display());
            return Ok(Vec::new());
        }

        let mut orders = Vec::new();
        for (index, row) in self.reader()?.deserialize::<OrderRow>().enumerate() {
            orders.push(row?.into_order(index + 1)?);
        }

        Ok(orders)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn ends_with_newline(file: &mut File) -> Result<bool, StorageError> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;

    Ok(last[0] == b'\n')
}
