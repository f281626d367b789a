use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::Rc;

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDateTime};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use super::desk::{OrderDesk, SubmissionState};
use super::order::{Order, OrderForm};
use super::*;
use crate::data::{Ledger, LedgerStore};
use crate::mirror::{MirrorError, MirrorStatus, RemoteError, Replicate};

/// Hands out one timestamp per call, a minute apart.
struct StepClock {
    next: Cell<NaiveDateTime>,
}

impl StepClock {
    fn starting_at(value: &str) -> StepClock {
        StepClock {
            next: Cell::new(NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).unwrap()),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> NaiveDateTime {
        let now = self.next.get();
        self.next.set(now + Duration::minutes(1));
        now
    }
}

/// Records every replicated order, optionally failing all calls.
#[derive(Clone, Default)]
struct FakeMirror {
    replicated: Rc<RefCell<Vec<Order>>>,
    calls: Rc<Cell<usize>>,
    fail: bool,
}

impl FakeMirror {
    fn failing() -> FakeMirror {
        FakeMirror {
            fail: true,
            ..FakeMirror::default()
        }
    }
}

impl Replicate for FakeMirror {
    fn replicate(&mut self, order: &Order) -> Result<(), MirrorError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(RemoteError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            }
            .into());
        }

        self.replicated.borrow_mut().push(order.clone());
        Ok(())
    }
}

fn desk(dir: &TempDir, file: &str, mirror: Option<FakeMirror>) -> Result<OrderDesk<FakeMirror, StepClock>> {
    let ledger = Ledger::open(dir.path().join(file));
    Ok(OrderDesk::with_clock(ledger, mirror, StepClock::starting_at("2024-01-01 10:00:00"))?)
}

fn form(name: &str, amount: &str) -> OrderForm {
    OrderForm::new(name, format!("{}@x.com", name.to_lowercase()), "2x widget", amount)
}

#[test]
fn test_open_creates_empty_ledger() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let desk = desk(&dir, "orders.csv", None)?;

    assert_eq!(desk.state(), SubmissionState::Empty);
    assert_eq!(
        fs::read_to_string(dir.path().join("orders.csv"))?,
        "Timestamp,Customer Name,Contact,Order Details,Amount\n"
    );
    assert_eq!(desk.load_all()?, vec![]);

    Ok(())
}

#[test]
fn test_submissions_load_back_in_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mirror = FakeMirror::default();
    let mut desk = desk(&dir, "orders.csv", Some(mirror.clone()))?;

    let mut expected = Vec::new();
    for (name, amount) in [("Alice", "19.99"), ("Bob", "5"), ("Alice", "19.99"), ("Carol", "1e2")] {
        let receipt = desk.submit(&form(name, amount))?;
        assert!(receipt.mirror.is_replicated());
        assert_eq!(desk.state(), SubmissionState::Done);
        expected.push(receipt.order);
    }

    assert_eq!(desk.load_all()?, expected);
    assert_eq!(*mirror.replicated.borrow(), expected);
    assert_eq!(expected[3].amount(), dec!(100));

    Ok(())
}

#[test]
fn test_timestamp_is_taken_at_save_time() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut desk = desk(&dir, "orders.csv", None)?;

    // A rejected submission does not consume a timestamp.
    assert!(desk.submit(&form("Alice", "abc")).is_err());
    let first = desk.submit(&form("Alice", "1"))?;
    let second = desk.submit(&form("Bob", "2"))?;

    assert_eq!(first.order.formatted_timestamp(), "2024-01-01 10:00:00");
    assert_eq!(second.order.formatted_timestamp(), "2024-01-01 10:01:00");

    Ok(())
}

#[test]
fn test_missing_field_rejects_without_writing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mirror = FakeMirror::default();
    let mut desk = desk(&dir, "orders.csv", Some(mirror.clone()))?;
    desk.submit(&form("Alice", "19.99"))?;
    let before = fs::read_to_string(dir.path().join("orders.csv"))?;

    let cases = [
        (OrderForm::new("", "c", "d", "1"), ValidationError::MissingCustomerName),
        (OrderForm::new("n", "", "d", "1"), ValidationError::MissingContact),
        (OrderForm::new("n", "c", "  ", "1"), ValidationError::MissingOrderDetails),
        (OrderForm::new("n", "c", "d", ""), ValidationError::MissingAmount),
    ];

    for (form, expected) in cases {
        match desk.submit(&form) {
            Err(SubmitError::Validation(err)) => assert_eq!(err, expected),
            other => bail!("expected {:?}, got {:?}", expected, other),
        }
        assert_eq!(desk.state(), SubmissionState::Rejected);
    }

    assert_eq!(fs::read_to_string(dir.path().join("orders.csv"))?, before);
    assert_eq!(mirror.calls.get(), 1);

    Ok(())
}

#[test]
fn test_amount_must_be_numeric() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut desk = desk(&dir, "orders.csv", None)?;

    match desk.submit(&form("Alice", "abc")) {
        Err(SubmitError::Validation(ValidationError::InvalidAmount(value))) => assert_eq!(value, "abc"),
        other => bail!("expected invalid amount, got {:?}", other),
    }
    assert_eq!(desk.load_all()?, vec![]);

    desk.submit(&form("Alice", "12.50"))?;
    let orders = desk.load_all()?;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].amount(), dec!(12.50));
    assert_eq!(orders[0].amount().to_string(), "12.50");

    Ok(())
}

#[test]
fn test_mirror_failure_keeps_local_record() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut desk = desk(&dir, "orders.csv", Some(FakeMirror::failing()))?;

    let receipt = desk.submit(&form("Alice", "19.99"))?;

    assert!(matches!(receipt.mirror, MirrorStatus::Failed(MirrorError::Remote(_))));
    assert_eq!(desk.state(), SubmissionState::Done);
    assert_eq!(desk.load_all()?, vec![receipt.order]);

    Ok(())
}

#[test]
fn test_resubmission_duplicates_rows_everywhere() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mirror = FakeMirror::default();
    let mut desk = desk(&dir, "orders.csv", Some(mirror.clone()))?;
    let order = form("Alice", "19.99");

    desk.submit(&order)?;
    desk.submit(&order)?;

    assert_eq!(desk.load_all()?.len(), 2);
    assert_eq!(mirror.replicated.borrow().len(), 2);

    Ok(())
}

#[test]
fn test_storage_failure_skips_mirror() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("orders.csv");
    fs::write(&path, "client,available,held\n1,2,3\n")?;
    let mirror = FakeMirror::default();
    let mut desk = desk(&dir, "orders.csv", Some(mirror.clone()))?;

    match desk.submit(&form("Alice", "19.99")) {
        Err(SubmitError::Storage(_)) => {},
        other => bail!("expected storage error, got {:?}", other),
    }

    assert_eq!(desk.state(), SubmissionState::Failed);
    assert_eq!(mirror.calls.get(), 0);
    assert_eq!(fs::read_to_string(&path)?, "client,available,held\n1,2,3\n");

    Ok(())
}

#[test]
fn test_without_mirror_is_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut desk = desk(&dir, "orders.csv", None)?;

    let receipt = desk.submit(&form("Alice", "19.99"))?;

    assert!(matches!(receipt.mirror, MirrorStatus::Skipped));
    assert!(desk.mirror().is_none());

    Ok(())
}

#[test]
fn test_clear_returns_to_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut desk = desk(&dir, "orders.csv", None)?;

    assert!(desk.submit(&OrderForm::default()).is_err());
    assert_eq!(desk.state(), SubmissionState::Rejected);
    desk.clear();
    assert_eq!(desk.state(), SubmissionState::Empty);

    desk.submit(&form("Alice", "1"))?;
    assert_eq!(desk.state(), SubmissionState::Done);
    desk.clear();
    assert_eq!(desk.state(), SubmissionState::Empty);

    Ok(())
}

#[test]
fn test_xlsx_ledger_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut desk = desk(&dir, "orders.xlsx", Some(FakeMirror::failing()))?;

    let first = desk.submit(&OrderForm::new("Alice", "alice@x.com", "2x widget", "19.99"))?;
    let second = desk.submit(&OrderForm::new("Bob", "555-0101", "1x gadget\ngift wrapped", "12.50"))?;

    let orders = desk.load_all()?;
    assert_eq!(orders, vec![first.order, second.order]);
    assert_eq!(orders[0].amount(), dec!(19.99));
    assert_eq!(desk.ledger().path(), dir.path().join("orders.xlsx"));

    Ok(())
}
