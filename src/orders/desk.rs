use log::{debug, info, warn};

use super::order::{Order, OrderForm};
use super::{Clock, SubmitError, SystemClock};
use crate::data::{Ledger, LedgerStore, StorageError};
use crate::mirror::{MirrorStatus, Replicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Empty,
    Filled,
    Validating,
    Persisting,
    Mirroring,
    Done,
    Rejected,
    Failed,
}

/// Result of a submission that reached the ledger.
#[derive(Debug)]
pub struct Receipt {
    pub order: Order,
    pub mirror: MirrorStatus,
}

/// Runs submissions against the ledger and, once committed, the mirror.
///
/// The ledger is the source of truth: a storage failure aborts the
/// submission, a mirror failure only shows up on the receipt.
pub struct OrderDesk<M: Replicate, C: Clock = SystemClock> {
    ledger: Ledger,
    mirror: Option<M>,
    clock: C,
    state: SubmissionState,
}

impl<M: Replicate> OrderDesk<M> {
    pub fn open(ledger: Ledger, mirror: Option<M>) -> Result<OrderDesk<M>, StorageError> {
        OrderDesk::with_clock(ledger, mirror, SystemClock)
    }
}

impl<M: Replicate, C: Clock> OrderDesk<M, C> {
    /// Creates the ledger file if it is missing.
    pub fn with_clock(ledger: Ledger, mirror: Option<M>, clock: C) -> Result<OrderDesk<M, C>, StorageError> {
        ledger.ensure_store_exists()?;

        Ok(OrderDesk {
            ledger,
            mirror,
            clock,
            state: SubmissionState::Empty,
        })
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mirror(&self) -> Option<&M> {
        self.mirror.as_ref()
    }

    pub fn load_all(&self) -> Result<Vec<Order>, StorageError> {
        self.ledger.load_all()
    }

    pub fn submit(&mut self, form: &OrderForm) -> Result<Receipt, SubmitError> {
        if !form.is_blank() {
            self.transition(SubmissionState::Filled);
        }
        self.transition(SubmissionState::Validating);

        let validated = match form.validate() {
            Ok(validated) => validated,
            Err(err) => {
                debug!("rejected order, err={}", err);
                self.transition(SubmissionState::Rejected);
                return Err(err.into());
            },
        };

        // Stamped here so the time reflects the save, not when the form was filled.
        let order = validated.stamp(self.clock.now());

        self.transition(SubmissionState::Persisting);
        if let Err(err) = self.ledger.append(&order) {
            warn!("failed to save order, path={}, err={}", self.ledger.path().display(), err);
            self.transition(SubmissionState::Failed);
            return Err(err.into());
        }
        info!("saved order, timestamp={}", order.formatted_timestamp());

        self.transition(SubmissionState::Mirroring);
        let mirror = self.replicate(&order);

        self.transition(SubmissionState::Done);
        Ok(Receipt { order, mirror })
    }

    /// Returns to `Empty`, discarding the outcome of the last submission.
    pub fn clear(&mut self) {
        self.transition(SubmissionState::Empty);
    }

    fn replicate(&mut self, order: &Order) -> MirrorStatus {
        let Some(mirror) = self.mirror.as_mut() else {
            debug!("no mirror configured, skipping replication");
            return MirrorStatus::Skipped;
        };

        match mirror.replicate(order) {
            Ok(()) => MirrorStatus::Replicated,
            Err(err) => {
                warn!("failed to mirror order, timestamp={}, err={}", order.formatted_timestamp(), err);
                MirrorStatus::Failed(err)
            },
        }
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!("submission state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
