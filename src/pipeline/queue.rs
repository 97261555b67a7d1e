// Sequential job queue
// A single dedicated worker drains jobs strictly in enqueue order; at most
// one job is in flight at any time. Cancellation is forward-only: pending
// jobs are dropped, the in-flight job is never interrupted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use uuid::Uuid;

/// Cooperative cancellation flag shared between a controller and long-running
/// work. Batch jobs poll it at safe checkpoints (per-stem boundaries) instead
/// of being forcibly terminated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One unit of queued work producing a value of type T
pub struct Job<T> {
    pub id: Uuid,
    pub label: String,
    task: Box<dyn FnOnce() -> T + Send>,
    on_complete: Option<Box<dyn FnOnce(T) + Send>>,
}

impl<T> Job<T> {
    pub fn new(label: impl Into<String>, task: impl FnOnce() -> T + Send + 'static) -> Self {
        Job {
            id: Uuid::new_v4(),
            label: label.into(),
            task: Box::new(task),
            on_complete: None,
        }
    }

    /// Attach a completion callback, invoked with the job's result after the
    /// task returns and before the next job starts
    pub fn with_callback(
        label: impl Into<String>,
        task: impl FnOnce() -> T + Send + 'static,
        on_complete: impl FnOnce(T) + Send + 'static,
    ) -> Self {
        Job {
            id: Uuid::new_v4(),
            label: label.into(),
            task: Box::new(task),
            on_complete: Some(Box::new(on_complete)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Idle,
    Running,
}

struct QueueInner<T> {
    jobs: VecDeque<Job<T>>,
    state: QueueState,
    cancelled: bool,
}

/// Strictly sequential FIFO job scheduler.
/// Job-level failures are ordinary values of T (callers use a Result); the
/// queue itself has no failure state.
pub struct JobQueue<T> {
    inner: Arc<(Mutex<QueueInner<T>>, Condvar)>,
}

impl<T: Send + 'static> JobQueue<T> {
    pub fn new() -> Self {
        JobQueue {
            inner: Arc::new((
                Mutex::new(QueueInner {
                    jobs: VecDeque::new(),
                    state: QueueState::Idle,
                    cancelled: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Append a job to the tail. A no-op on a cancelled queue until the next
    /// start() resets it.
    pub fn enqueue(&self, job: Job<T>) {
        let (lock, _) = &*self.inner;
        let mut inner = lock.lock().unwrap();

        if inner.cancelled {
            log::warn!("job '{}' dropped: queue is cancelled", job.label);
            return;
        }

        inner.jobs.push_back(job);
    }

    /// Begin draining the queue on a dedicated worker thread.
    /// A no-op while already running.
    pub fn start(&self) {
        {
            let (lock, _) = &*self.inner;
            let mut inner = lock.lock().unwrap();

            if inner.state == QueueState::Running {
                return;
            }
            inner.state = QueueState::Running;
            inner.cancelled = false;
        }

        let inner = Arc::clone(&self.inner);
        thread::spawn(move || Self::drain(&inner));
    }

    fn drain(inner: &Arc<(Mutex<QueueInner<T>>, Condvar)>) {
        loop {
            let job = {
                let (lock, cvar) = &**inner;
                let mut guard = lock.lock().unwrap();
                match guard.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        guard.state = QueueState::Idle;
                        cvar.notify_all();
                        return;
                    }
                }
            };

            let label = job.label.clone();
            log::info!("job '{}' ({}) started", label, job.id);

            let result = (job.task)();
            if let Some(on_complete) = job.on_complete {
                on_complete(result);
            }

            log::info!("job '{}' finished", label);
        }
    }

    /// Drop every not-yet-started job. The in-flight job, if any, runs to
    /// completion.
    pub fn cancel(&self) {
        let (lock, _) = &*self.inner;
        let mut inner = lock.lock().unwrap();

        let dropped = inner.jobs.len();
        inner.jobs.clear();
        inner.cancelled = true;

        log::info!("queue cancelled, {} pending job(s) dropped", dropped);
    }

    pub fn is_idle(&self) -> bool {
        let (lock, _) = &*self.inner;
        let inner = lock.lock().unwrap();
        inner.state == QueueState::Idle
    }

    /// Number of not-yet-started jobs
    pub fn pending(&self) -> usize {
        let (lock, _) = &*self.inner;
        let inner = lock.lock().unwrap();
        inner.jobs.len()
    }

    /// Block until the queue has drained and returned to idle
    pub fn wait_idle(&self) {
        let (lock, cvar) = &*self.inner;
        let mut inner = lock.lock().unwrap();
        while inner.state == QueueState::Running {
            inner = cvar.wait(inner).unwrap();
        }
    }
}

impl<T: Send + 'static> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_enqueue_order_with_one_callback_each() {
        let queue: JobQueue<usize> = JobQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let callbacks = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let order = Arc::clone(&order);
            let callbacks = Arc::clone(&callbacks);
            queue.enqueue(Job::with_callback(
                format!("job-{}", i),
                move || {
                    order.lock().unwrap().push(i);
                    i
                },
                move |result| {
                    assert_eq!(result, i);
                    callbacks.fetch_add(1, Ordering::SeqCst);
                },
            ));
        }

        queue.start();
        queue.wait_idle();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(callbacks.load(Ordering::SeqCst), 5);
        assert!(queue.is_idle());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_cancel_prevents_pending_jobs() {
        let queue: JobQueue<()> = JobQueue::new();
        let ran = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let ran = Arc::clone(&ran);
            queue.enqueue(Job::new(name, move || {
                ran.lock().unwrap().push(name);
                // Keep job A in flight long enough for cancel() to land
                thread::sleep(Duration::from_millis(100));
            }));
        }

        queue.start();
        // Let A begin, then cancel while it is still running
        thread::sleep(Duration::from_millis(30));
        queue.cancel();
        queue.wait_idle();

        assert_eq!(*ran.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_enqueue_after_cancel_is_dropped() {
        let queue: JobQueue<()> = JobQueue::new();
        queue.cancel();

        queue.enqueue(Job::new("late", || {}));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_start_resets_cancelled_state() {
        let queue: JobQueue<u32> = JobQueue::new();
        queue.cancel();
        queue.start();
        queue.wait_idle();

        let done = Arc::new(AtomicUsize::new(0));
        let done_clone = Arc::clone(&done);
        queue.enqueue(Job::new("after-restart", move || {
            done_clone.fetch_add(1, Ordering::SeqCst);
            1
        }));
        queue.start();
        queue.wait_idle();

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_while_running_is_a_no_op() {
        let queue: JobQueue<()> = JobQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        queue.enqueue(Job::new("slow", move || {
            thread::sleep(Duration::from_millis(50));
            c.fetch_add(1, Ordering::SeqCst);
        }));

        queue.start();
        queue.start();
        queue.start();
        queue.wait_idle();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_token_flag() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
