use chrono::{Local, NaiveDateTime, SubsecRound};
use thiserror::Error;

use crate::data::StorageError;

pub mod desk;
pub mod order;

#[cfg(test)]
mod desk_tests;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, PartialEq, Error)]
pub enum ValidationError {
    #[error("customer name is required")]
    MissingCustomerName,
    #[error("contact is required")]
    MissingContact,
    #[error("order details are required")]
    MissingOrderDetails,
    #[error("amount is required")]
    MissingAmount,
    #[error("amount must be a valid number, got {0:?}")]
    InvalidAmount(String),
    #[error("amount {0} is outside the supported range (28 significant digits, at most 28 decimal places)")]
    AmountOutOfRange(String),
}

/// Failures that abort a submission. Mirror failures are not part of this,
/// they are reported on the receipt of an otherwise successful submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("failed to save order: {0}")]
    Storage(#[from] StorageError),
}

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time, truncated to whole seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local().trunc_subsecs(0)
    }
}
