//! Notification dispatcher — one worker task serializing speech/UI output.
//!
//! Producers push onto a bounded FIFO and return immediately. The worker
//! pops one message at a time and awaits the backend under a timeout. A
//! timed-out call is dropped before the next message starts, so
//! notifications never overlap and a hung backend cannot hold the worker. Shutdown pushes a sentinel; the worker exits when
//! it reaches it.

use crate::collaborators::{NotificationBackend, NotificationError, Notifier};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const DEFAULT_CAPACITY: usize = 32;
const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 5_000;

/// What to do with a new message when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OverflowPolicy {
    /// Evict the oldest pending message to make room.
    DropOldest,
    /// Discard the incoming message.
    DropNewest,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub backend_timeout_ms: u64,
}

impl DispatcherConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::DropOldest,
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
        }
    }
}

enum Command {
    Speak(String),
    Shutdown,
}

struct Queue {
    items: VecDeque<Command>,
    /// Cleared by `shutdown`; later messages are swallowed.
    accepting: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Notify,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pop(&self) -> Option<Command> {
        self.queue().items.pop_front()
    }
}

/// Clone-safe handle to the notification worker.
#[derive(Clone)]
pub struct NotificationDispatcher {
    shared: Arc<Shared>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<B: NotificationBackend>(backend: B, config: DispatcherConfig) -> Self {
        let dispatcher = Self::unstarted(config);
        let shared = dispatcher.shared.clone();
        let handle = tokio::spawn(run_worker(shared, backend, config.backend_timeout()));
        *dispatcher
            .shared
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
        tracing::info!(
            capacity = config.capacity,
            overflow = ?config.overflow,
            timeout_ms = config.backend_timeout_ms,
            "notification dispatcher started"
        );
        dispatcher
    }

    fn unstarted(config: DispatcherConfig) -> Self {
        let config = DispatcherConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    items: VecDeque::with_capacity(config.capacity),
                    accepting: true,
                }),
                wake: Notify::new(),
                worker: Mutex::new(None),
            }),
            config,
        }
    }

    /// Queue a message. Never blocks; after shutdown this is a no-op.
    pub fn enqueue(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut queue = self.shared.queue();
            if !queue.accepting {
                tracing::debug!(text = %text, "notification dropped: dispatcher shut down");
                return;
            }
            if queue.items.len() >= self.config.capacity {
                match self.config.overflow {
                    OverflowPolicy::DropOldest => {
                        if let Some(Command::Speak(evicted)) = queue.items.pop_front() {
                            tracing::warn!(evicted = %evicted, "notification queue full; dropped oldest");
                        }
                    }
                    OverflowPolicy::DropNewest => {
                        tracing::warn!(text = %text, "notification queue full; dropped newest");
                        return;
                    }
                }
            }
            queue.items.push_back(Command::Speak(text));
        }
        self.shared.wake.notify_one();
    }

    /// Stop accepting messages and tell the worker to exit once it has
    /// delivered everything queued before this call. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue();
            if !queue.accepting {
                return;
            }
            queue.accepting = false;
            queue.items.push_back(Command::Shutdown);
        }
        self.shared.wake.notify_one();
        tracing::info!("notification dispatcher shutdown requested");
    }

    pub fn is_shut_down(&self) -> bool {
        !self.shared.queue().accepting
    }

    /// Messages waiting for the worker (excluding one in flight).
    pub fn pending(&self) -> usize {
        self.shared
            .queue()
            .items
            .iter()
            .filter(|c| matches!(c, Command::Speak(_)))
            .count()
    }

    /// Wait for the worker to exit, aborting it once `grace` elapses.
    ///
    /// Returns `true` if the worker finished on its own. Only the first
    /// caller waits; later calls return `true` immediately.
    pub async fn join(&self, grace: Duration) -> bool {
        let handle = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(mut handle) = handle else {
            return true;
        };
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => {
                tracing::info!("notification dispatcher stopped");
                true
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(grace_ms = grace.as_millis() as u64, "notification worker aborted after grace period");
                false
            }
        }
    }
}

impl Notifier for NotificationDispatcher {
    fn notify(&self, text: &str) {
        self.enqueue(text);
    }
}

async fn run_worker<B: NotificationBackend>(shared: Arc<Shared>, backend: B, timeout: Duration) {
    tracing::debug!("notification worker started");
    loop {
        match shared.pop() {
            Some(Command::Speak(text)) => deliver(&backend, text, timeout).await,
            Some(Command::Shutdown) => break,
            // Notify keeps a permit, so a push between pop and await is not lost.
            None => shared.wake.notified().await,
        }
    }
    tracing::debug!("notification worker exiting");
}

async fn deliver<B: NotificationBackend>(backend: &B, text: String, timeout: Duration) {
    // On timeout the call's future is dropped, which cancels it.
    let result = match tokio::time::timeout(timeout, backend.speak(&text)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::Timeout(timeout)),
    };

    match result {
        Ok(()) => tracing::trace!(text = %text, "notification delivered"),
        Err(e) => tracing::warn!(error = %e, text = %text, "notification failed; continuing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder {
        spoken: Arc<Mutex<Vec<String>>>,
        delay: Duration,
        fail_on: Option<&'static str>,
        hang_on: Option<&'static str>,
    }

    impl Recorder {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl NotificationBackend for Recorder {
        async fn speak(&self, text: &str) -> Result<(), NotificationError> {
            if self.hang_on == Some(text) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.spoken.lock().unwrap().push(text.to_string());
            if self.fail_on == Some(text) {
                return Err(NotificationError::Backend("speaker unplugged".into()));
            }
            Ok(())
        }
    }

    fn queued(dispatcher: &NotificationDispatcher) -> Vec<String> {
        dispatcher
            .shared
            .queue()
            .items
            .iter()
            .filter_map(|c| match c {
                Command::Speak(t) => Some(t.clone()),
                Command::Shutdown => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_delivers_in_fifo_order() {
        let backend = Recorder::default();
        let dispatcher = NotificationDispatcher::spawn(backend.clone(), DispatcherConfig::default());
        for text in ["one", "two", "three"] {
            dispatcher.enqueue(text);
        }
        dispatcher.shutdown();
        assert!(dispatcher.join(Duration::from_secs(2)).await);
        assert_eq!(backend.spoken(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_enqueue_does_not_wait_for_slow_backend() {
        let backend = Recorder::with_delay(Duration::from_millis(100));
        let dispatcher = NotificationDispatcher::spawn(
            backend,
            DispatcherConfig {
                capacity: 64,
                ..DispatcherConfig::default()
            },
        );

        let start = Instant::now();
        for i in 0..50 {
            dispatcher.enqueue(format!("message {i}"));
        }
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(50), "enqueue took {elapsed:?}");

        dispatcher.shutdown();
        dispatcher.join(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_no_backend_call_after_shutdown() {
        let backend = Recorder::default();
        let dispatcher = NotificationDispatcher::spawn(backend.clone(), DispatcherConfig::default());
        dispatcher.enqueue("before");
        dispatcher.shutdown();
        dispatcher.enqueue("after");
        assert!(dispatcher.join(Duration::from_secs(2)).await);

        dispatcher.enqueue("long after");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.spoken(), vec!["before"]);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dispatcher = NotificationDispatcher::spawn(Recorder::default(), DispatcherConfig::default());
        dispatcher.shutdown();
        dispatcher.shutdown();
        assert!(dispatcher.is_shut_down());
        assert!(dispatcher.join(Duration::from_secs(2)).await);
        assert!(dispatcher.join(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_backend_failure_does_not_stop_worker() {
        let backend = Recorder {
            fail_on: Some("bad"),
            ..Recorder::default()
        };
        let dispatcher = NotificationDispatcher::spawn(backend.clone(), DispatcherConfig::default());
        dispatcher.enqueue("bad");
        dispatcher.enqueue("good");
        dispatcher.shutdown();
        assert!(dispatcher.join(Duration::from_secs(2)).await);
        assert_eq!(backend.spoken(), vec!["bad", "good"]);
    }

    #[tokio::test]
    async fn test_hung_backend_times_out_and_worker_exits() {
        let backend = Recorder::with_delay(Duration::from_millis(400));
        let dispatcher = NotificationDispatcher::spawn(
            backend,
            DispatcherConfig {
                backend_timeout_ms: 50,
                ..DispatcherConfig::default()
            },
        );
        dispatcher.enqueue("stuck");
        dispatcher.shutdown();

        let start = Instant::now();
        assert!(dispatcher.join(Duration::from_secs(2)).await);
        assert!(start.elapsed() < Duration::from_millis(300), "took {:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_timed_out_call_is_cancelled_before_next_message() {
        let backend = Recorder {
            hang_on: Some("stuck"),
            ..Recorder::default()
        };
        let dispatcher = NotificationDispatcher::spawn(
            backend.clone(),
            DispatcherConfig {
                backend_timeout_ms: 50,
                ..DispatcherConfig::default()
            },
        );
        dispatcher.enqueue("stuck");
        dispatcher.enqueue("next");
        dispatcher.shutdown();
        assert!(dispatcher.join(Duration::from_secs(2)).await);

        // The hung call never resumes after its timeout.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.spoken(), vec!["next"]);
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_and_shutdown() {
        let backend = Recorder::default();
        let dispatcher = NotificationDispatcher::spawn(backend.clone(), DispatcherConfig::default());

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let d = dispatcher.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        d.enqueue(format!("{p}-{i}"));
                    }
                })
            })
            .collect();
        dispatcher.shutdown();
        for p in producers {
            p.join().unwrap();
        }

        assert!(dispatcher.join(Duration::from_secs(5)).await);
        let spoken_after_join = backend.spoken().len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.spoken().len(), spoken_after_join);
    }

    #[test]
    fn test_drop_oldest_keeps_latest() {
        let dispatcher = NotificationDispatcher::unstarted(DispatcherConfig {
            capacity: 2,
            overflow: OverflowPolicy::DropOldest,
            ..DispatcherConfig::default()
        });
        dispatcher.enqueue("a");
        dispatcher.enqueue("b");
        dispatcher.enqueue("c");
        assert_eq!(queued(&dispatcher), vec!["b", "c"]);
    }

    #[test]
    fn test_drop_newest_keeps_earliest() {
        let dispatcher = NotificationDispatcher::unstarted(DispatcherConfig {
            capacity: 2,
            overflow: OverflowPolicy::DropNewest,
            ..DispatcherConfig::default()
        });
        dispatcher.enqueue("a");
        dispatcher.enqueue("b");
        dispatcher.enqueue("c");
        assert_eq!(queued(&dispatcher), vec!["a", "b"]);
        assert_eq!(dispatcher.pending(), 2);
    }

    #[test]
    fn test_shutdown_sentinel_ignores_capacity() {
        let dispatcher = NotificationDispatcher::unstarted(DispatcherConfig {
            capacity: 1,
            ..DispatcherConfig::default()
        });
        dispatcher.enqueue("a");
        dispatcher.shutdown();
        dispatcher.enqueue("b");
        assert_eq!(queued(&dispatcher), vec!["a"]);
        assert!(matches!(
            dispatcher.shared.queue().items.back(),
            Some(Command::Shutdown)
        ));
    }
}
