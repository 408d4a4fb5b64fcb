//! Single-in-flight command queue
//!
//! Commands added to the queue are dispatched strictly in FIFO order, one at a
//! time. A dispatched item stays active until something settles it: either the
//! operation itself (through its [`Settle`] handle) or the protocol layer via
//! [`CommandQueue::resolve_active`] / [`CommandQueue::reject_active`] in
//! response to device replies. Only then is the next item dispatched.
//!
//! Recurring tasks are checked on a fixed tick. A task whose previous run has
//! not finished is skipped, so runs of the same task never overlap. Recurring
//! tasks usually submit ordinary items and therefore queue behind user
//! commands rather than preempting them.
//!
//! Dispatching spawns the operation on the current tokio runtime.

use futures_util::future::{BoxFuture, FutureExt};
use grblstream_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Default recurring-task check period (about 60 Hz)
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

type Operation<T, P> = Box<dyn FnOnce(Settle<T, P>) -> BoxFuture<'static, ()> + Send>;
type RecurringFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle identifying a recurring task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecurringTaskId(Uuid);

impl RecurringTaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RecurringTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", &self.0.to_string()[..8])
    }
}

/// Snapshot of queue occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueSize {
    /// Items waiting to be dispatched
    pub pending: usize,
    /// Whether an item is currently dispatched
    pub active: bool,
}

impl QueueSize {
    /// Total items, including the active one
    pub fn total(&self) -> usize {
        self.pending + usize::from(self.active)
    }

    pub fn is_idle(&self) -> bool {
        self.total() == 0
    }
}

struct QueueItem<T, P> {
    id: u64,
    operation: Operation<T, P>,
    payload: P,
    completion: oneshot::Sender<Result<T>>,
}

struct ActiveItem<T, P> {
    id: u64,
    payload: P,
    completion: oneshot::Sender<Result<T>>,
}

struct QueueState<T, P> {
    pending: VecDeque<QueueItem<T, P>>,
    active: Option<ActiveItem<T, P>>,
    next_id: u64,
}

impl<T, P> QueueState<T, P> {
    fn size(&self) -> QueueSize {
        QueueSize {
            pending: self.pending.len(),
            active: self.active.is_some(),
        }
    }
}

struct RecurringEntry {
    id: RecurringTaskId,
    task: RecurringFn,
    interval: Duration,
    last_run: Option<Instant>,
    running: Arc<AtomicBool>,
}

struct Inner<T, P> {
    state: Mutex<QueueState<T, P>>,
    recurring: Mutex<Vec<RecurringEntry>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    size_tx: watch::Sender<QueueSize>,
    tick: Duration,
}

impl<T: Send + 'static, P: Send + 'static> Inner<T, P> {
    /// Dispatch the next pending item if nothing is active
    fn proceed(self: &Arc<Self>) {
        let (operation, settle) = {
            let mut state = self.state.lock();
            if state.active.is_some() {
                return;
            }

            let Some(item) = state.pending.pop_front() else {
                self.size_tx.send_replace(state.size());
                return;
            };

            let QueueItem {
                id,
                operation,
                payload,
                completion,
            } = item;
            state.active = Some(ActiveItem {
                id,
                payload,
                completion,
            });
            self.size_tx.send_replace(state.size());

            let settle = Settle {
                id,
                queue: Arc::downgrade(self),
            };
            (operation, settle)
        };

        tokio::spawn(operation(settle));
    }

    /// Settle the active item; with `id` set, only if that item is still active
    fn settle(self: &Arc<Self>, id: Option<u64>, result: Result<T>) -> bool {
        let active = {
            let mut state = self.state.lock();
            match (&state.active, id) {
                (None, _) => return false,
                (Some(active), Some(id)) if active.id != id => return false,
                _ => state.active.take(),
            }
        };

        if let Some(active) = active {
            let _ = active.completion.send(result);
        }
        self.proceed();
        true
    }

    fn run_due_recurring(&self) {
        let now = Instant::now();
        let mut due = Vec::new();

        for entry in self.recurring.lock().iter_mut() {
            if entry.running.load(Ordering::SeqCst) {
                continue;
            }
            if entry
                .last_run
                .is_some_and(|last| now.duration_since(last) < entry.interval)
            {
                continue;
            }

            entry.running.store(true, Ordering::SeqCst);
            entry.last_run = Some(now);
            due.push((entry.task.clone(), entry.running.clone()));
        }

        for (task, running) in due {
            tokio::spawn(async move {
                task().await;
                running.store(false, Ordering::SeqCst);
            });
        }
    }
}

impl<T, P> Drop for Inner<T, P> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}

/// Settlement handle passed to a dispatched operation
///
/// Settling is a no-op once the item is no longer active (for example after
/// the protocol layer already resolved it or the queue was cleared).
pub struct Settle<T, P> {
    id: u64,
    queue: Weak<Inner<T, P>>,
}

impl<T: Send + 'static, P: Send + 'static> Settle<T, P> {
    /// Resolve this item and advance the queue
    pub fn resolve(self, value: T) -> bool {
        match self.queue.upgrade() {
            Some(inner) => inner.settle(Some(self.id), Ok(value)),
            None => false,
        }
    }

    /// Reject this item and advance the queue
    pub fn reject(self, error: Error) -> bool {
        match self.queue.upgrade() {
            Some(inner) => inner.settle(Some(self.id), Err(error)),
            None => false,
        }
    }
}

/// Completion of a queued item
///
/// Resolves with the value or error the item was settled with. An item
/// dropped without settling (queue dropped) completes with a discard error.
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| Err(Error::discarded("queue dropped"))))
    }
}

/// FIFO dispatcher with at most one in-flight item
///
/// `T` is the value an item resolves with, `P` an opaque payload attached to
/// each item and readable while it is active. Cloning yields another handle to
/// the same queue.
pub struct CommandQueue<T, P = ()> {
    inner: Arc<Inner<T, P>>,
}

impl<T, P> Clone for CommandQueue<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static, P: Send + 'static> Default for CommandQueue<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static, P: Send + 'static> CommandQueue<T, P> {
    /// Create a queue using the default recurring-task tick
    pub fn new() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }

    /// Create a queue with a custom recurring-task tick
    pub fn with_tick(tick: Duration) -> Self {
        let (size_tx, _) = watch::channel(QueueSize::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: None,
                    next_id: 0,
                }),
                recurring: Mutex::new(Vec::new()),
                ticker: Mutex::new(None),
                size_tx,
                tick,
            }),
        }
    }

    /// Add an item to the queue
    ///
    /// `operation` is invoked with a [`Settle`] handle once every earlier
    /// item has settled. The returned [`Completion`] resolves when this item
    /// settles. The item is enqueued immediately, before the completion is
    /// first polled.
    pub fn add<F, Fut>(&self, operation: F, payload: P) -> Completion<T>
    where
        F: FnOnce(Settle<T, P>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back(QueueItem {
                id,
                operation: Box::new(move |settle| operation(settle).boxed()),
                payload,
                completion: tx,
            });
            self.inner.size_tx.send_replace(state.size());
        }

        self.inner.proceed();
        Completion { rx }
    }

    /// Resolve the active item, if any, and dispatch the next one
    pub fn resolve_active(&self, value: T) -> bool {
        self.inner.settle(None, Ok(value))
    }

    /// Reject the active item, if any, and dispatch the next one
    pub fn reject_active(&self, error: Error) -> bool {
        self.inner.settle(None, Err(error))
    }

    /// Whether an item is currently dispatched
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().active.is_some()
    }

    /// Current occupancy
    pub fn size(&self) -> QueueSize {
        self.inner.state.lock().size()
    }

    /// Reject the active item and every pending item without invoking them
    pub fn clear(&self) {
        self.clear_with("queue cleared");
    }

    /// Like [`clear`](Self::clear), recording why the items were discarded
    ///
    /// Completions are rejected in submission order. The queue stays usable.
    pub fn clear_with(&self, reason: &str) {
        let (active, pending) = {
            let mut state = self.inner.state.lock();
            let active = state.active.take();
            let pending = std::mem::take(&mut state.pending);
            self.inner.size_tx.send_replace(state.size());
            (active, pending)
        };

        if let Some(active) = active {
            let _ = active.completion.send(Err(Error::discarded(reason)));
        }
        for item in pending {
            let _ = item.completion.send(Err(Error::discarded(reason)));
        }
    }

    /// Wait until nothing is pending or active
    ///
    /// Resolves immediately when the queue is already idle.
    pub async fn on_idle(&self) {
        let mut rx = self.inner.size_tx.subscribe();
        let _ = rx.wait_for(|size| size.is_idle()).await;
    }

    /// Wait until no item is waiting for dispatch (one may still be active)
    pub async fn on_empty(&self) {
        let mut rx = self.inner.size_tx.subscribe();
        let _ = rx.wait_for(|size| size.pending == 0).await;
    }

    /// Register a task to run every `interval`
    ///
    /// The first run happens on the next tick. A run is skipped while the
    /// previous run of the same task is still in progress.
    pub fn add_recurring<F, Fut>(&self, task: F, interval: Duration) -> RecurringTaskId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = RecurringTaskId::new();
        self.inner.recurring.lock().push(RecurringEntry {
            id,
            task: Arc::new(move || task().boxed()),
            interval,
            last_run: None,
            running: Arc::new(AtomicBool::new(false)),
        });
        self.ensure_ticker();
        tracing::debug!("Recurring {} added, every {:?}", id, interval);
        id
    }

    /// Stop a recurring task; a run in progress is not interrupted
    pub fn remove_recurring(&self, id: RecurringTaskId) -> bool {
        let mut recurring = self.inner.recurring.lock();
        let before = recurring.len();
        recurring.retain(|entry| entry.id != id);
        before != recurring.len()
    }

    /// Number of registered recurring tasks
    pub fn recurring_count(&self) -> usize {
        self.inner.recurring.lock().len()
    }

    /// Stop recurring tasks, clear the queue and wait for it to become idle
    pub async fn terminate(&self) {
        if let Some(ticker) = self.inner.ticker.lock().take() {
            ticker.abort();
        }
        self.inner.recurring.lock().clear();
        self.clear_with("queue terminated");
        self.on_idle().await;
    }

    fn ensure_ticker(&self) {
        let mut ticker = self.inner.ticker.lock();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.tick;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.run_due_recurring();
            }
        }));
    }
}

impl<T: Send + 'static, P: Clone + Send + 'static> CommandQueue<T, P> {
    /// Payload of the active item
    pub fn current_payload(&self) -> Option<P> {
        self.inner
            .state
            .lock()
            .active
            .as_ref()
            .map(|active| active.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_local_operation_resolves_itself() {
        let queue: CommandQueue<u32> = CommandQueue::new();
        let value = queue
            .add(|settle| async move {
                settle.resolve(7);
            }, ())
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert!(queue.size().is_idle());
    }

    #[tokio::test]
    async fn test_second_item_waits_for_first() {
        let queue: CommandQueue<&'static str, &'static str> = CommandQueue::new();
        let started = Arc::new(AtomicUsize::new(0));

        let s1 = started.clone();
        let first = queue.add(
            move |_settle| async move {
                s1.fetch_add(1, Ordering::SeqCst);
            },
            "first",
        );
        let s2 = started.clone();
        let second = queue.add(
            move |_settle| async move {
                s2.fetch_add(1, Ordering::SeqCst);
            },
            "second",
        );

        tokio::task::yield_now().await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(queue.current_payload(), Some("first"));
        assert_eq!(queue.size(), QueueSize { pending: 1, active: true });

        assert!(queue.resolve_active("a"));
        assert_eq!(first.await.unwrap(), "a");

        tokio::task::yield_now().await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(queue.current_payload(), Some("second"));

        assert!(queue.reject_active(Error::other("boom")));
        assert_eq!(second.await.unwrap_err(), Error::other("boom"));
        assert!(!queue.is_pending());
    }

    #[tokio::test]
    async fn test_resolve_without_active_is_noop() {
        let queue: CommandQueue<()> = CommandQueue::new();
        assert!(!queue.resolve_active(()));
        assert!(!queue.reject_active(Error::other("nothing")));
    }

    #[tokio::test]
    async fn test_stale_settle_is_ignored() {
        let queue: CommandQueue<u8> = CommandQueue::new();
        let (tx, rx) = oneshot::channel();
        let first = queue.add(
            move |settle| async move {
                let _ = tx.send(settle);
            },
            (),
        );
        let settle = rx.await.unwrap();

        queue.resolve_active(1);
        assert_eq!(first.await.unwrap(), 1);

        let second = queue.add(|_settle| async {}, ());
        tokio::task::yield_now().await;
        assert!(!settle.resolve(99));
        queue.resolve_active(2);
        assert_eq!(second.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_rejects_everything_without_invoking() {
        let queue: CommandQueue<()> = CommandQueue::new();
        let invoked = Arc::new(AtomicUsize::new(0));

        let mut completions = Vec::new();
        for _ in 0..3 {
            let invoked = invoked.clone();
            completions.push(queue.add(
                move |_settle| async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                },
                (),
            ));
        }
        tokio::task::yield_now().await;
        queue.clear_with("controller reset");

        for completion in completions {
            let err = completion.await.unwrap_err();
            assert!(err.is_discarded());
            assert!(err.to_string().contains("controller reset"));
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert!(queue.size().is_idle());

        // Still usable afterwards
        let value = queue.add(|settle| async move { settle.resolve(()); }, ());
        assert!(value.await.is_ok());
    }

    #[tokio::test]
    async fn test_on_idle_resolves_after_last_item() {
        let queue: CommandQueue<()> = CommandQueue::new();
        queue.on_idle().await;

        let _pending = queue.add(|_settle| async {}, ());
        let q = queue.clone();
        let waiter = tokio::spawn(async move { q.on_idle().await });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        queue.resolve_active(());
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_on_empty_ignores_active_item() {
        let queue: CommandQueue<()> = CommandQueue::new();
        let _active = queue.add(|_settle| async {}, ());
        queue.on_empty().await;
        assert!(queue.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_runs_do_not_overlap() {
        let queue: CommandQueue<()> = CommandQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let (r, c, m) = (runs.clone(), concurrent.clone(), max_concurrent.clone());
        queue.add_recurring(
            move || {
                let (r, c, m) = (r.clone(), c.clone(), m.clone());
                async move {
                    let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now, Ordering::SeqCst);
                    r.fetch_add(1, Ordering::SeqCst);
                    // Slower than the interval
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    c.fetch_sub(1, Ordering::SeqCst);
                }
            },
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
        let count = runs.load(Ordering::SeqCst);
        assert!((5..=11).contains(&count), "ran {} times", count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_submissions_queue_behind_user_command() {
        let queue: CommandQueue<&'static str, &'static str> = CommandQueue::new();

        let user = queue.add(|_settle| async {}, "user");
        let q = queue.clone();
        let id = queue.add_recurring(
            move || {
                let q = q.clone();
                async move {
                    let _ = q.add(|settle| async move { settle.resolve("polled"); }, "poll").await;
                }
            },
            Duration::from_millis(50),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        // The poll is stuck behind the user command
        assert_eq!(queue.current_payload(), Some("user"));
        assert_eq!(queue.size().pending, 1);

        queue.resolve_active("done");
        assert_eq!(user.await.unwrap(), "done");
        assert!(queue.remove_recurring(id));
        queue.on_idle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_stops_recurring_and_clears() {
        let queue: CommandQueue<()> = CommandQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        queue.add_recurring(
            move || {
                let r = r.clone();
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                }
            },
            Duration::from_millis(10),
        );
        let outstanding = queue.add(|_settle| async {}, ());

        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.terminate().await;
        assert!(outstanding.await.unwrap_err().is_discarded());
        assert_eq!(queue.recurring_count(), 0);

        let after = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after);
    }
}
