//! The async result cache behind loaders, lazy modules and actions.
//!
//! A [`Task`] wraps an asynchronous operation and keeps the outcome of its
//! latest run. Every run gets a new generation number; a run that finishes
//! after a newer one has started is ignored, so callers never observe a
//! result that was superseded while it was in flight.
//!
//! The operation itself is driven by [`tokio::task::spawn_local`], which
//! means every method that starts a run must be called from inside a
//! [`tokio::task::LocalSet`].

use std::cell::RefCell;
use std::fmt::Debug;
use std::future::Future;
use std::rc::{Rc, Weak};

use serde::Serialize;
use tokio::sync::Notify;

use crate::core::{Hash32, LocalFuture};
use crate::error::TaskError;

type Operation<A, D> = Rc<dyn Fn(A) -> LocalFuture<anyhow::Result<D>>>;
type OnSettle<D> = Box<dyn FnOnce(&Snapshot<D>)>;

/// The `{loading, data, error}` read view of a [`Task`] at one point in time.
#[derive(Clone, Debug)]
pub struct Snapshot<D> {
    pub loading: bool,
    pub data: Option<D>,
    pub error: Option<TaskError>,
}

impl<D> Snapshot<D> {
    /// Nothing loaded and nothing in flight.
    pub fn empty() -> Self {
        Self {
            loading: false,
            data: None,
            error: None,
        }
    }

    /// A run is in flight and there is no result yet.
    pub fn pending() -> Self {
        Self {
            loading: true,
            data: None,
            error: None,
        }
    }

    /// Settled with `data`.
    pub fn ready(data: D) -> Self {
        Self {
            loading: false,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: TaskError) -> Self {
        Self {
            loading: false,
            data: None,
            error: Some(error),
        }
    }
}

impl<D> Default for Snapshot<D> {
    fn default() -> Self {
        Self::empty()
    }
}

struct State<D> {
    /// Generation of the run allowed to commit.
    current: u64,
    loading: bool,
    data: Option<D>,
    error: Option<TaskError>,
    /// Fingerprint of the arguments last accepted by [`Task::cache`].
    fingerprint: Option<Hash32>,
}

impl<D: Clone> State<D> {
    fn snapshot(&self) -> Snapshot<D> {
        Snapshot {
            loading: self.loading,
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

/// Generic async-operation wrapper with result caching by argument
/// fingerprint and cancellation of superseded runs.
///
/// Cloning a `Task` yields another handle to the same state.
pub struct Task<A, D> {
    operation: Operation<A, D>,
    state: Rc<RefCell<State<D>>>,
    settled: Rc<Notify>,
}

impl<A, D> Clone for Task<A, D> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            state: self.state.clone(),
            settled: self.settled.clone(),
        }
    }
}

impl<A, D> Debug for Task<A, D>
where
    D: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Task")
            .field("generation", &state.current)
            .field("loading", &state.loading)
            .field("data", &state.data)
            .field("error", &state.error)
            .finish()
    }
}

/// Shorthand for [`Task::new`].
pub fn task<A, D, F, Fut>(operation: F) -> Task<A, D>
where
    A: 'static,
    D: Clone + 'static,
    F: Fn(A) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<D>> + 'static,
{
    Task::new(operation)
}

impl<A, D> Task<A, D>
where
    A: 'static,
    D: Clone + 'static,
{
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(A) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<D>> + 'static,
    {
        Self {
            operation: Rc::new(move |args| -> LocalFuture<anyhow::Result<D>> {
                Box::pin(operation(args))
            }),
            state: Rc::new(RefCell::new(State {
                current: 0,
                loading: false,
                data: None,
                error: None,
                fingerprint: None,
            })),
            settled: Rc::new(Notify::new()),
        }
    }

    /// Creates a task whose snapshot holds `data` until its first run.
    pub fn with_initial<F, Fut>(operation: F, data: D) -> Self
    where
        F: Fn(A) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<D>> + 'static,
    {
        let task = Self::new(operation);
        task.state.borrow_mut().data = Some(data);
        task
    }

    pub fn snapshot(&self) -> Snapshot<D> {
        self.state.borrow().snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Starts a new generation and hands the operation to the local executor.
    /// Returns immediately with the state flipped to loading.
    fn start(&self, args: A, on_settle: Option<OnSettle<D>>) -> u64 {
        let generation = {
            let mut state = self.state.borrow_mut();
            state.current += 1;
            state.loading = true;
            state.data = None;
            state.error = None;
            state.current
        };

        let future = (self.operation)(args);
        let state = Rc::downgrade(&self.state);
        let settled = self.settled.clone();

        tokio::task::spawn_local(async move {
            let result = future.await;
            if let Some(snapshot) = commit(&state, generation, result) {
                settled.notify_waiters();
                if let Some(on_settle) = on_settle {
                    on_settle(&snapshot);
                }
            }
        });

        generation
    }

    /// Runs the operation with `args`, superseding any run still in flight.
    ///
    /// The run starts immediately, before the returned future is polled.
    /// The future resolves to the latest generation's outcome: if another run
    /// starts before this one finishes, the caller receives the newer run's
    /// result, not its own.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a [`tokio::task::LocalSet`].
    pub fn run(&self, args: A) -> impl Future<Output = Snapshot<D>> + 'static {
        self.start(args, None);

        let state = self.state.clone();
        let settled = self.settled.clone();

        async move {
            loop {
                let notified = settled.notified();
                if !state.borrow().loading {
                    return state.borrow().snapshot();
                }
                notified.await;
            }
        }
    }

    /// Returns the cached snapshot for `args`, starting a run only when the
    /// argument fingerprint differs from the last accepted one.
    ///
    /// Never waits: on a fingerprint change the result is a fresh loading
    /// snapshot, and `on_change` is invoked with the terminal snapshot once
    /// that run settles (unless it is superseded first).
    ///
    /// # Panics
    ///
    /// Panics when a run has to be started outside of a
    /// [`tokio::task::LocalSet`].
    pub fn cache<F>(&self, args: &A, on_change: F) -> Snapshot<D>
    where
        A: Serialize + Clone,
        F: FnOnce(&Snapshot<D>) + 'static,
    {
        let fingerprint = Hash32::hash_json(args).unwrap_or_else(|err| {
            // unserializable arguments collapse onto a single cache entry
            tracing::warn!("task arguments are not serializable: {err}");
            Hash32::default()
        });

        {
            let mut state = self.state.borrow_mut();
            if state.fingerprint == Some(fingerprint) {
                tracing::trace!(%fingerprint, "task cache hit");
                return state.snapshot();
            }
            state.fingerprint = Some(fingerprint);
        }

        tracing::trace!(%fingerprint, "task cache miss");
        self.start(args.clone(), Some(Box::new(on_change)));
        self.snapshot()
    }

    /// Forgets the cached result and the argument fingerprint, so the next
    /// [`cache`](Self::cache) call runs unconditionally. A run in flight at
    /// this point will not commit.
    pub fn invalidate(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.current += 1;
            state.loading = false;
            state.data = None;
            state.error = None;
            state.fingerprint = None;
        }

        self.settled.notify_waiters();
    }
}

/// Writes `result` into the task state if `generation` is still current.
fn commit<D: Clone>(
    state: &Weak<RefCell<State<D>>>,
    generation: u64,
    result: anyhow::Result<D>,
) -> Option<Snapshot<D>> {
    // the task itself is gone, nobody is left to observe the result
    let state = state.upgrade()?;
    let mut state = state.borrow_mut();

    if state.current != generation {
        tracing::trace!(generation, current = state.current, "dropping stale result");
        return None;
    }

    match result {
        Ok(data) => {
            state.data = Some(data);
            state.error = None;
        }
        Err(err) => {
            tracing::warn!("task failed: {err:#}");
            state.data = None;
            state.error = Some(TaskError::from(err));
        }
    }

    state.loading = false;
    Some(state.snapshot())
}
