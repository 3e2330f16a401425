//! Scripted in-memory driver for facade-level tests.
//!
//! The simulator records every driver call and replays queued canned
//! outcomes, so tests can assert which calls reached the driver (and in
//! what order) without any SQL engine behind them. Failures and
//! per-call latency are injectable; the source can be told to refuse
//! acquisition.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    ResultSet, SqlValue, UpdateResult,
    driver::{ConnectionSource, DriverConnection, DriverError},
};

/// One driver call observed by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Query { sql: String, params: Vec<SqlValue> },
    Update { sql: String, params: Vec<SqlValue> },
    SetAutoCommit(bool),
    Commit,
    Rollback,
    Close,
}

/// Canned outcome for an upcoming driver call.
#[derive(Debug)]
pub enum SimulatedOutcome {
    Rows(ResultSet),
    Updated(UpdateResult),
    Unit,
    Fail(DriverError),
}

/// Shared script and call log.
///
/// Clone the `Arc` into a [`SimulatorSource`] and keep one reference in
/// the test to queue outcomes and inspect the calls afterwards.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct SimulatorScript {
    outcomes: Mutex<VecDeque<SimulatedOutcome>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SimulatorScript {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a result-set outcome for the next unconsumed call.
    pub fn push_rows(&self, results: ResultSet) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(SimulatedOutcome::Rows(results));
    }

    /// Queue an update outcome.
    pub fn push_updated(&self, result: UpdateResult) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(SimulatedOutcome::Updated(result));
    }

    /// Queue a failure.
    pub fn push_failure(&self, error: DriverError) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(SimulatedOutcome::Fail(error));
    }

    /// Sleep this long inside every driver call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Every call recorded so far, in execution order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of driver calls that were ever executing at the same
    /// instant. Stays at 1 when mutual exclusion holds.
    #[must_use]
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn enter(&self, call: RecordedCall) -> Option<SimulatedOutcome> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        self.calls.lock().unwrap().push(call);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        self.outcomes.lock().unwrap().pop_front()
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `DriverConnection` replaying the shared script.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct SimulatorConnection {
    script: Arc<SimulatorScript>,
}

impl SimulatorConnection {
    fn run(
        &self,
        call: RecordedCall,
        fallback: SimulatedOutcome,
    ) -> Result<SimulatedOutcome, DriverError> {
        let outcome = self.script.enter(call);
        self.script.exit();

        match outcome {
            Some(SimulatedOutcome::Fail(error)) => Err(error),
            Some(outcome) => Ok(outcome),
            None => Ok(fallback),
        }
    }
}

impl DriverConnection for SimulatorConnection {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet, DriverError> {
        let outcome = self.run(
            RecordedCall::Query {
                sql: sql.into(),
                params: params.to_vec(),
            },
            SimulatedOutcome::Rows(ResultSet::default()),
        )?;

        match outcome {
            SimulatedOutcome::Rows(results) => Ok(results),
            _ => Err(DriverError::statement("scripted outcome is not a result set")),
        }
    }

    fn update(&mut self, sql: &str, params: &[SqlValue]) -> Result<UpdateResult, DriverError> {
        let outcome = self.run(
            RecordedCall::Update {
                sql: sql.into(),
                params: params.to_vec(),
            },
            SimulatedOutcome::Updated(UpdateResult::default()),
        )?;

        match outcome {
            SimulatedOutcome::Updated(result) => Ok(result),
            _ => Err(DriverError::statement("scripted outcome is not an update")),
        }
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), DriverError> {
        self.run(RecordedCall::SetAutoCommit(auto_commit), SimulatedOutcome::Unit)?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.run(RecordedCall::Commit, SimulatedOutcome::Unit)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.run(RecordedCall::Rollback, SimulatedOutcome::Unit)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.run(RecordedCall::Close, SimulatedOutcome::Unit)?;
        Ok(())
    }
}

/// `ConnectionSource` handing out connections that share one script.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct SimulatorSource {
    script: Arc<SimulatorScript>,
    closed: AtomicBool,
    refuse_acquire: AtomicBool,
}

impl SimulatorSource {
    #[must_use]
    pub fn new(script: Arc<SimulatorScript>) -> Self {
        Self {
            script,
            closed: AtomicBool::new(false),
            refuse_acquire: AtomicBool::new(false),
        }
    }

    /// Make every future acquire fail, as an exhausted pool would.
    pub fn refuse_acquire(&self) {
        self.refuse_acquire.store(true, Ordering::SeqCst);
    }
}

impl ConnectionSource for SimulatorSource {
    fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::fatal("source is closed"));
        }
        if self.refuse_acquire.load(Ordering::SeqCst) {
            return Err(DriverError::fatal("no connections available"));
        }

        Ok(Box::new(SimulatorConnection {
            script: Arc::clone(&self.script),
        }))
    }

    fn release(&self, mut connection: Box<dyn DriverConnection>) {
        if let Err(error) = connection.close() {
            log::warn!("release: driver close failed: {error:?}");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
