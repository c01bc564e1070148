//! Resource readiness tracking.
//!
//! A [`Tracker`] is a counting gate shared by every asynchronous loader of a
//! world. Loaders register before they start their I/O and resolve when it
//! finishes. Registration and activation are separate steps: callers register
//! loads while they discover them during scene construction and then call
//! [`Tracker::start`] once no more registrations will arrive synchronously.
//! The ready callback fires exactly once, after `start` and after the last
//! pending load resolved, whatever order the loads finish in.
//!
//! Everything here is single-threaded. Loads complete as local tasks on the
//! same thread that started tracking, so the state lives in an
//! `Rc<RefCell<_>>` and no locking is involved.

use std::{cell::RefCell, fmt, future::Future, rc::Rc};

use futures::{
    FutureExt,
    channel::oneshot,
    future::{self, Either},
};
use instant::{Duration, Instant};

use crate::{config::ViolationPolicy, error::ProtocolViolation};

/// Why a registered load did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadFailure {
    pub asset: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Handed to the ready callback (and to [`Tracker::ready`] waiters).
#[derive(Clone, Debug, Default)]
pub struct ReadyReport {
    /// Loads that resolved without producing their asset.
    pub failures: Vec<LoadFailure>,
    /// Time between `start` and firing.
    pub elapsed: Duration,
}

impl ReadyReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

type ReadyCallback = Box<dyn FnOnce(ReadyReport)>;

struct TrackerState {
    pending: usize,
    started: bool,
    fired: bool,
    on_ready: Option<ReadyCallback>,
    waiters: Vec<oneshot::Sender<ReadyReport>>,
    failures: Vec<LoadFailure>,
    report: Option<ReadyReport>,
    policy: ViolationPolicy,
    load_timeout: Option<Duration>,
    started_at: Option<Instant>,
}

/// Everything needed to notify listeners, taken out of the state so that the
/// callback runs without the state being borrowed.
struct Firing {
    callback: Option<ReadyCallback>,
    waiters: Vec<oneshot::Sender<ReadyReport>>,
    report: ReadyReport,
}

impl TrackerState {
    fn take_firing(&mut self) -> Option<Firing> {
        if !self.started || self.pending > 0 || self.fired {
            return None;
        }
        self.fired = true;
        let report = ReadyReport {
            failures: self.failures.clone(),
            elapsed: self
                .started_at
                .map(|at| at.elapsed())
                .unwrap_or_default(),
        };
        self.report = Some(report.clone());
        Some(Firing {
            callback: self.on_ready.take(),
            waiters: std::mem::take(&mut self.waiters),
            report,
        })
    }
}

impl Firing {
    fn dispatch(self) {
        log::info!(
            "All resources resolved after {:?} ({} failed)",
            self.report.elapsed,
            self.report.failures.len()
        );
        for waiter in self.waiters {
            // A dropped waiter just means nobody is listening anymore.
            let _ = waiter.send(self.report.clone());
        }
        if let Some(callback) = self.callback {
            callback(self.report);
        }
    }
}

fn violation(policy: ViolationPolicy, violation: ProtocolViolation) -> Result<(), ProtocolViolation> {
    match policy {
        ViolationPolicy::Strict => Err(violation),
        ViolationPolicy::Lenient => {
            log::warn!("Ignoring protocol violation: {}", violation);
            Ok(())
        }
    }
}

/// Reference-counted readiness gate. Clones share the same gate.
#[derive(Clone)]
pub struct Tracker {
    state: Rc<RefCell<TrackerState>>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Tracker")
            .field("pending", &state.pending)
            .field("started", &state.started)
            .field("fired", &state.fired)
            .finish()
    }
}

impl Tracker {
    pub fn new(on_ready: impl FnOnce(ReadyReport) + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(TrackerState {
                pending: 0,
                started: false,
                fired: false,
                on_ready: Some(Box::new(on_ready)),
                waiters: Vec::new(),
                failures: Vec::new(),
                report: None,
                policy: ViolationPolicy::default(),
                load_timeout: None,
                started_at: None,
            })),
        }
    }

    pub fn with_policy(self, policy: ViolationPolicy) -> Self {
        self.state.borrow_mut().policy = policy;
        self
    }

    pub fn with_load_timeout(self, timeout: Option<Duration>) -> Self {
        self.state.borrow_mut().load_timeout = timeout;
        self
    }

    pub fn policy(&self) -> ViolationPolicy {
        self.state.borrow().policy
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.state.borrow().load_timeout
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending
    }

    pub fn is_started(&self) -> bool {
        self.state.borrow().started
    }

    /// Whether the ready callback has fired.
    pub fn is_ready(&self) -> bool {
        self.state.borrow().fired
    }

    pub fn failures(&self) -> Vec<LoadFailure> {
        self.state.borrow().failures.clone()
    }

    /// Register one unit of pending work.
    pub fn increment(&self) -> Result<(), ProtocolViolation> {
        self.count_one().map(|_| ())
    }

    /// Returns whether the registration was actually counted; a lenient tracker
    /// ignores registrations after it fired.
    fn count_one(&self) -> Result<bool, ProtocolViolation> {
        let mut state = self.state.borrow_mut();
        if state.fired {
            return violation(state.policy, ProtocolViolation::IncrementAfterReady).map(|_| false);
        }
        state.pending += 1;
        log::debug!("Tracking {} pending resource(s)", state.pending);
        Ok(true)
    }

    /// Resolve one unit of pending work, firing if it was the last one after `start`.
    pub fn decrement(&self) -> Result<(), ProtocolViolation> {
        let firing = {
            let mut state = self.state.borrow_mut();
            if state.pending == 0 {
                return violation(state.policy, ProtocolViolation::UnbalancedDecrement);
            }
            state.pending -= 1;
            state.take_firing()
        };
        if let Some(firing) = firing {
            firing.dispatch();
        }
        Ok(())
    }

    /// Close the synchronous registration phase. Fires right away when nothing is pending.
    pub fn start(&self) -> Result<(), ProtocolViolation> {
        let firing = {
            let mut state = self.state.borrow_mut();
            if state.started {
                return violation(state.policy, ProtocolViolation::AlreadyStarted);
            }
            state.started = true;
            state.started_at = Some(Instant::now());
            log::debug!("Tracking started with {} pending resource(s)", state.pending);
            state.take_firing()
        };
        if let Some(firing) = firing {
            firing.dispatch();
        }
        Ok(())
    }

    /// Register a load and get a token that resolves it exactly once.
    pub fn register(&self, asset: impl Into<String>) -> Result<LoadToken, ProtocolViolation> {
        let asset = asset.into();
        let counted = self.count_one()?;
        log::debug!("Registered load of {}", asset);
        Ok(LoadToken {
            tracker: self.clone(),
            asset,
            counted,
            resolved: false,
        })
    }

    fn record_failure(&self, failure: LoadFailure) {
        log::warn!(
            "Load of {} resolved as {:?}: {}",
            failure.asset,
            failure.kind,
            failure.reason
        );
        self.state.borrow_mut().failures.push(failure);
    }

    /// Resolves with the ready report once the tracker fired, immediately if it already has.
    pub fn ready(&self) -> impl Future<Output = ReadyReport> + 'static {
        let mut state = self.state.borrow_mut();
        if let Some(report) = state.report.clone() {
            return Either::Left(future::ready(report));
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        Either::Right(rx.map(|report| {
            report.unwrap_or_else(|_| ReadyReport {
                failures: vec![LoadFailure {
                    asset: String::from("tracker"),
                    kind: FailureKind::Cancelled,
                    reason: String::from("tracker dropped before it fired"),
                }],
                elapsed: Duration::ZERO,
            })
        }))
    }
}

/// A registered load. Resolve it with [`complete`](Self::complete) or
/// [`fail`](Self::fail); dropping it unresolved counts as a cancellation.
/// Either way the tracker is decremented exactly once.
#[must_use = "dropping a load token cancels the load"]
pub struct LoadToken {
    tracker: Tracker,
    asset: String,
    counted: bool,
    resolved: bool,
}

impl fmt::Debug for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadToken")
            .field("asset", &self.asset)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl LoadToken {
    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn complete(mut self) {
        self.resolve(None);
    }

    pub fn fail(mut self, kind: FailureKind, reason: impl fmt::Display) {
        self.resolve(Some((kind, reason.to_string())));
    }

    fn resolve(&mut self, failure: Option<(FailureKind, String)>) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        if let Some((kind, reason)) = failure {
            self.tracker.record_failure(LoadFailure {
                asset: self.asset.clone(),
                kind,
                reason,
            });
        }
        if self.counted {
            if let Err(e) = self.tracker.decrement() {
                log::error!("Resolving {} broke the tracker bookkeeping: {}", self.asset, e);
            }
        }
    }
}

impl Drop for LoadToken {
    fn drop(&mut self) {
        if !self.resolved {
            self.resolve(Some((
                FailureKind::Cancelled,
                String::from("dropped before completion"),
            )));
        }
    }
}
