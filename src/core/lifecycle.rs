//! Purpose: Disposal-notification contract for wrappers that own a native handle.
//! Exports: `Disposable`, `Lifecycle`, `Release`, `DisposeEvent`, `DisposePhase`, `Subscription`,
//! `Observer`, `ObserverError`.
//! Role: Per-object observer lists fired around the release of a native resource.
//! Invariants: The disposed flag flips false -> true exactly once and never reverts.
//! Invariants: Pre-dispose observers run before release; post-dispose observers run after the flag is set.
//! Invariants: Observers run synchronously in registration order; one failure never stops the fan-out.
//! Invariants: A panicking observer or release counts as a failure; disposal still completes.
use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};

pub type ObserverError = Box<dyn StdError + Send + Sync>;
pub type Observer = Box<dyn Fn(&DisposeEvent<'_>) -> Result<(), ObserverError> + Send + Sync>;

type SharedObserver = Arc<dyn Fn(&DisposeEvent<'_>) -> Result<(), ObserverError> + Send + Sync>;

const LIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisposePhase {
    Disposing,
    Disposed,
}

impl DisposePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            DisposePhase::Disposing => "disposing",
            DisposePhase::Disposed => "disposed",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DisposeEvent<'a> {
    pub phase: DisposePhase,
    pub label: &'a str,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Subscription(u64);

impl Subscription {
    /// Returned when the observer could never fire; it is not stored.
    pub const INACTIVE: Subscription = Subscription(0);

    pub fn id(self) -> u64 {
        self.0
    }

    pub fn from_id(id: u64) -> Self {
        Self(id)
    }
}

/// Observable teardown of a native-backed object.
pub trait Disposable {
    /// Releases the resource once; later calls are no-ops returning `Ok`.
    ///
    /// Disposal always completes. An `Observer` error reports the first
    /// observer failure (returned error or panic) after every observer has run.
    fn dispose(&self) -> Result<(), Error>;

    fn is_disposed(&self) -> bool;

    /// Returns [`Subscription::INACTIVE`] once the phase can no longer fire.
    fn on_disposing(&self, observer: Observer) -> Subscription;

    fn on_disposed(&self, observer: Observer) -> Subscription;

    fn unsubscribe(&self, subscription: Subscription) -> bool;
}

/// Releases a native resource. Called at most once.
pub trait Release: Send {
    fn release(self);
}

impl<F: FnOnce() + Send> Release for F {
    fn release(self) {
        self()
    }
}

#[derive(Default)]
struct Observers {
    next_id: u64,
    disposing: Vec<(Subscription, SharedObserver)>,
    disposed: Vec<(Subscription, SharedObserver)>,
}

impl Observers {
    fn add(&mut self, phase: DisposePhase, observer: Observer) -> Subscription {
        self.next_id += 1;
        let subscription = Subscription(self.next_id);
        let list = match phase {
            DisposePhase::Disposing => &mut self.disposing,
            DisposePhase::Disposed => &mut self.disposed,
        };
        list.push((subscription, Arc::from(observer)));
        subscription
    }

    fn snapshot(&self, phase: DisposePhase) -> Vec<SharedObserver> {
        let list = match phase {
            DisposePhase::Disposing => &self.disposing,
            DisposePhase::Disposed => &self.disposed,
        };
        list.iter().map(|(_, observer)| Arc::clone(observer)).collect()
    }
}

pub struct Lifecycle<R: Release> {
    label: String,
    state: AtomicU8,
    resource: Mutex<Option<R>>,
    observers: Mutex<Observers>,
}

impl<R: Release> Lifecycle<R> {
    pub fn new(label: impl Into<String>, resource: R) -> Self {
        Self {
            label: label.into(),
            state: AtomicU8::new(LIVE),
            resource: Mutex::new(Some(resource)),
            observers: Mutex::new(Observers::default()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs `f` against the live resource, or fails once disposal has started.
    pub fn with_resource<T>(&self, f: impl FnOnce(&R) -> T) -> Result<T, Error> {
        let guard = lock(&self.resource);
        match guard.as_ref() {
            Some(resource) if self.state.load(Ordering::Acquire) == LIVE => Ok(f(resource)),
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{} is disposed", self.label))),
        }
    }

    fn subscribe(&self, phase: DisposePhase, observer: Observer) -> Subscription {
        let mut observers = lock(&self.observers);
        // Checked under the observer lock so a racing dispose cannot clear the list in between.
        let state = self.state.load(Ordering::Acquire);
        let reachable = match phase {
            DisposePhase::Disposing => state == LIVE,
            DisposePhase::Disposed => state != DISPOSED,
        };
        if !reachable {
            debug!(label = %self.label, phase = phase.as_str(), "observer registered too late; dropped");
            return Subscription::INACTIVE;
        }
        observers.add(phase, observer)
    }

    fn record_failure(&self, first_failure: &mut Option<Error>, failure: Error) {
        if first_failure.is_none() {
            *first_failure = Some(failure);
        } else {
            warn!(label = %self.label, error = %failure, source = ?StdError::source(&failure).map(|source| source.to_string()), "additional dispose failure");
        }
    }

    fn notify(&self, phase: DisposePhase, first_failure: &mut Option<Error>) {
        let observers = lock(&self.observers).snapshot(phase);
        let event = DisposeEvent {
            phase,
            label: &self.label,
        };
        for observer in observers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer(&event)))
                .unwrap_or_else(|payload| {
                    Err(ObserverError::from(format!(
                        "observer panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            let Err(err) = outcome else {
                continue;
            };
            let failure = Error::new(ErrorKind::Observer)
                .with_message(format!("{} observer failed for {}", phase.as_str(), self.label))
                .with_boxed_source(err);
            self.record_failure(first_failure, failure);
        }
    }
}

impl<R: Release> Disposable for Lifecycle<R> {
    fn dispose(&self) -> Result<(), Error> {
        if self
            .state
            .compare_exchange(LIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let mut first_failure = None;
        self.notify(DisposePhase::Disposing, &mut first_failure);
        let resource = lock(&self.resource).take();
        if let Some(resource) = resource {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| resource.release())) {
                let failure = Error::new(ErrorKind::Internal).with_message(format!(
                    "native release panicked for {}: {}",
                    self.label,
                    panic_message(payload.as_ref())
                ));
                self.record_failure(&mut first_failure, failure);
            }
        }
        self.state.store(DISPOSED, Ordering::Release);
        debug!(label = %self.label, "native resource released");
        self.notify(DisposePhase::Disposed, &mut first_failure);

        // Neither list can fire again.
        {
            let mut observers = lock(&self.observers);
            observers.disposing.clear();
            observers.disposed.clear();
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DISPOSED
    }

    fn on_disposing(&self, observer: Observer) -> Subscription {
        self.subscribe(DisposePhase::Disposing, observer)
    }

    fn on_disposed(&self, observer: Observer) -> Subscription {
        self.subscribe(DisposePhase::Disposed, observer)
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.disposing.len() + observers.disposed.len();
        observers.disposing.retain(|(id, _)| *id != subscription);
        observers.disposed.retain(|(id, _)| *id != subscription);
        before != observers.disposing.len() + observers.disposed.len()
    }
}

impl<R: Release> Drop for Lifecycle<R> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(label = %self.label, error = %err, "dispose observer failed during drop");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
