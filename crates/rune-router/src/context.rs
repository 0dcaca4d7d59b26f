//! Script and UI execution contexts.
//!
//! Router work is posted as tasks to one of two single-threaded contexts. Tasks posted to
//! the same context run one at a time in posting order.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// Runs page script and owns script-side page state.
    Script,
    /// Owns the render tree and dialogs.
    Ui,
}

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Posts tasks onto an execution context.
pub trait TaskExecutor: Send + Sync {
    fn post(&self, context: ExecutionContext, name: &'static str, task: Task);

    fn post_delayed(
        &self,
        context: ExecutionContext,
        name: &'static str,
        delay: Duration,
        task: Task,
    );
}

struct QueuedTask {
    seq: u64,
    context: ExecutionContext,
    name: &'static str,
    task: Task,
}

struct DelayedTask {
    due: Duration,
    queued: QueuedTask,
}

#[derive(Default)]
struct ManualState {
    script: VecDeque<QueuedTask>,
    ui: VecDeque<QueuedTask>,
    delayed: Vec<DelayedTask>,
    now: Duration,
    next_seq: u64,
    executed: Vec<(ExecutionContext, &'static str)>,
}

impl ManualState {
    fn queue_mut(&mut self, context: ExecutionContext) -> &mut VecDeque<QueuedTask> {
        match context {
            ExecutionContext::Script => &mut self.script,
            ExecutionContext::Ui => &mut self.ui,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Takes whichever queued task was posted first across both contexts.
    fn pop_earliest(&mut self) -> Option<QueuedTask> {
        let script = self.script.front().map(|t| t.seq);
        let ui = self.ui.front().map(|t| t.seq);
        match (script, ui) {
            (Some(s), Some(u)) if u < s => self.ui.pop_front(),
            (Some(_), _) => self.script.pop_front(),
            (None, Some(_)) => self.ui.pop_front(),
            (None, None) => None,
        }
    }
}

/// Deterministic executor driven by the caller.
///
/// Nothing runs until [`ManualExecutor::run_until_idle`] or [`ManualExecutor::advance`] is
/// called. Delayed tasks wait on a virtual clock.
#[derive(Default)]
pub struct ManualExecutor {
    state: Mutex<ManualState>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a single task. Returns `false` when nothing is queued.
    pub fn run_one(&self) -> bool {
        let Some(queued) = self.state.lock().pop_earliest() else {
            return false;
        };
        trace!(context = ?queued.context, task = queued.name, "running task");
        (queued.task)();
        self.state.lock().executed.push((queued.context, queued.name));
        true
    }

    /// Runs queued tasks, including the ones they post, until both contexts are empty.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Moves the virtual clock forward, releasing due delayed tasks in due order, and
    /// runs until idle.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = self.run_until_idle();
        loop {
            let released = {
                let mut state = self.state.lock();
                let next = state
                    .delayed
                    .iter()
                    .enumerate()
                    .filter(|(_, delayed)| delayed.due <= target)
                    .min_by_key(|(_, delayed)| (delayed.due, delayed.queued.seq))
                    .map(|(idx, _)| idx);
                match next {
                    Some(idx) => {
                        let delayed = state.delayed.swap_remove(idx);
                        state.now = delayed.due;
                        let mut queued = delayed.queued;
                        queued.seq = state.next_seq();
                        let context = queued.context;
                        state.queue_mut(context).push_back(queued);
                        true
                    }
                    None => {
                        state.now = target;
                        false
                    }
                }
            };
            if !released {
                break;
            }
            ran += self.run_until_idle();
        }
        ran
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending(&self, context: ExecutionContext) -> usize {
        let mut state = self.state.lock();
        state.queue_mut(context).len()
    }

    pub fn pending_delayed(&self) -> usize {
        self.state.lock().delayed.len()
    }

    /// Names of every task run so far, with the context it ran on.
    pub fn executed(&self) -> Vec<(ExecutionContext, &'static str)> {
        self.state.lock().executed.clone()
    }
}

impl TaskExecutor for ManualExecutor {
    fn post(&self, context: ExecutionContext, name: &'static str, task: Task) {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        state.queue_mut(context).push_back(QueuedTask {
            seq,
            context,
            name,
            task,
        });
    }

    fn post_delayed(
        &self,
        context: ExecutionContext,
        name: &'static str,
        delay: Duration,
        task: Task,
    ) {
        let mut state = self.state.lock();
        let seq = state.next_seq();
        let due = state.now + delay;
        state.delayed.push(DelayedTask {
            due,
            queued: QueuedTask {
                seq,
                context,
                name,
                task,
            },
        });
    }
}

enum WorkerMessage {
    Run(&'static str, Task),
    Shutdown,
}

struct Worker {
    sender: Mutex<Option<Sender<WorkerMessage>>>,
    join: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Worker {
    fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<WorkerMessage>();
        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Ok(message) = rx.recv() {
                match message {
                    WorkerMessage::Run(name, task) => {
                        trace!(task = name, "running task");
                        task();
                    }
                    WorkerMessage::Shutdown => break,
                }
            }
        })?;
        let thread_id = join.thread().id();
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
            thread_id,
        })
    }

    fn sender(&self) -> Option<Sender<WorkerMessage>> {
        self.sender.lock().clone()
    }

    fn shutdown(&self) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(WorkerMessage::Shutdown);
        }
        if thread::current().id() == self.thread_id {
            // Dropped from its own thread; the loop exits after the current task.
            return;
        }
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

enum TimerMessage {
    Schedule {
        due: Instant,
        context: ExecutionContext,
        name: &'static str,
        task: Task,
    },
    Shutdown,
}

struct Deadline {
    due: Instant,
    seq: u64,
    context: ExecutionContext,
    name: &'static str,
    task: Task,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    // Reversed so the max-heap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

/// Holds delayed tasks in a deadline heap and hands each one to its context when due.
struct TimerThread {
    sender: Mutex<Option<Sender<TimerMessage>>>,
    join: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl TimerThread {
    fn spawn(script: Sender<WorkerMessage>, ui: Sender<WorkerMessage>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<TimerMessage>();
        let join = thread::Builder::new().name("rune-timer".to_string()).spawn(move || {
            let mut pending = BinaryHeap::<Deadline>::new();
            let mut next_seq = 0u64;
            loop {
                let now = Instant::now();
                while pending.peek().is_some_and(|deadline| deadline.due <= now) {
                    let Some(deadline) = pending.pop() else {
                        break;
                    };
                    let target = match deadline.context {
                        ExecutionContext::Script => &script,
                        ExecutionContext::Ui => &ui,
                    };
                    if target
                        .send(WorkerMessage::Run(deadline.name, deadline.task))
                        .is_err()
                    {
                        warn!(context = ?deadline.context, task = deadline.name, "execution context stopped; task dropped");
                    }
                }

                let message = match pending.peek() {
                    Some(next) => match rx.recv_timeout(next.due.saturating_duration_since(now)) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    },
                    None => match rx.recv() {
                        Ok(message) => message,
                        Err(_) => break,
                    },
                };
                match message {
                    TimerMessage::Schedule {
                        due,
                        context,
                        name,
                        task,
                    } => {
                        pending.push(Deadline {
                            due,
                            seq: next_seq,
                            context,
                            name,
                            task,
                        });
                        next_seq += 1;
                    }
                    TimerMessage::Shutdown => break,
                }
            }
            if !pending.is_empty() {
                debug!(dropped = pending.len(), "timer thread stopped with pending tasks");
            }
        })?;
        let thread_id = join.thread().id();
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
            thread_id,
        })
    }

    fn schedule(&self, context: ExecutionContext, name: &'static str, delay: Duration, task: Task) {
        let message = TimerMessage::Schedule {
            due: Instant::now() + delay,
            context,
            name,
            task,
        };
        let sent = match self.sender.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        };
        if !sent {
            warn!(?context, task = name, "timer thread stopped; delayed task dropped");
        }
    }

    fn shutdown(&self) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(TimerMessage::Shutdown);
        }
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

/// One background thread per execution context, fed over an mpsc channel, plus one
/// timer thread for delayed tasks.
pub struct ThreadedExecutor {
    script: Worker,
    ui: Worker,
    timer: TimerThread,
}

impl ThreadedExecutor {
    pub fn new() -> std::io::Result<Self> {
        let script = Worker::spawn("rune-script")?;
        let ui = Worker::spawn("rune-ui")?;
        let (Some(script_tx), Some(ui_tx)) = (script.sender(), ui.sender()) else {
            return Err(std::io::Error::other("worker channel closed at startup"));
        };
        let timer = TimerThread::spawn(script_tx, ui_tx)?;
        Ok(Self { script, ui, timer })
    }

    fn worker(&self, context: ExecutionContext) -> &Worker {
        match context {
            ExecutionContext::Script => &self.script,
            ExecutionContext::Ui => &self.ui,
        }
    }

    /// True when called from the thread backing `context`.
    pub fn runs_on(&self, context: ExecutionContext) -> bool {
        thread::current().id() == self.worker(context).thread_id
    }
}

impl TaskExecutor for ThreadedExecutor {
    fn post(&self, context: ExecutionContext, name: &'static str, task: Task) {
        match self.worker(context).sender() {
            Some(tx) => {
                if tx.send(WorkerMessage::Run(name, task)).is_err() {
                    warn!(?context, task = name, "execution context stopped; task dropped");
                }
            }
            None => warn!(?context, task = name, "execution context stopped; task dropped"),
        }
    }

    fn post_delayed(
        &self,
        context: ExecutionContext,
        name: &'static str,
        delay: Duration,
        task: Task,
    ) {
        self.timer.schedule(context, name, delay, task);
    }
}

impl Drop for ThreadedExecutor {
    fn drop(&mut self) {
        self.timer.shutdown();
        self.script.shutdown();
        self.ui.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &'static str| -> Task {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(label))
        };
        (log, make)
    }

    #[test]
    fn manual_executor_runs_in_posting_order_across_contexts() {
        let executor = ManualExecutor::new();
        let (log, task) = recorder();
        executor.post(ExecutionContext::Script, "a", task("a"));
        executor.post(ExecutionContext::Ui, "b", task("b"));
        executor.post(ExecutionContext::Script, "c", task("c"));
        assert_eq!(executor.pending(ExecutionContext::Script), 2);

        assert_eq!(executor.run_until_idle(), 3);
        assert_eq!(*log.lock(), ["a", "b", "c"]);
        assert_eq!(
            executor.executed(),
            [
                (ExecutionContext::Script, "a"),
                (ExecutionContext::Ui, "b"),
                (ExecutionContext::Script, "c"),
            ]
        );
    }

    #[test]
    fn tasks_posted_while_running_are_drained() {
        let executor = Arc::new(ManualExecutor::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_exec = Arc::clone(&executor);
        let inner_log = Arc::clone(&log);
        executor.post(
            ExecutionContext::Script,
            "outer",
            Box::new(move || {
                inner_log.lock().push("outer");
                let log = Arc::clone(&inner_log);
                inner_exec.post(
                    ExecutionContext::Ui,
                    "inner",
                    Box::new(move || log.lock().push("inner")),
                );
            }),
        );
        executor.run_until_idle();
        assert_eq!(*log.lock(), ["outer", "inner"]);
    }

    #[test]
    fn delayed_tasks_wait_for_the_virtual_clock() {
        let executor = ManualExecutor::new();
        let (log, task) = recorder();
        executor.post_delayed(ExecutionContext::Script, "late", Duration::from_millis(50), task("late"));
        executor.post_delayed(ExecutionContext::Script, "early", Duration::from_millis(10), task("early"));

        assert_eq!(executor.run_until_idle(), 0);
        assert_eq!(executor.advance(Duration::from_millis(20)), 1);
        assert_eq!(*log.lock(), ["early"]);
        assert_eq!(executor.now(), Duration::from_millis(20));

        executor.advance(Duration::from_millis(30));
        assert_eq!(*log.lock(), ["early", "late"]);
        assert_eq!(executor.pending_delayed(), 0);
    }

    #[test]
    fn threaded_executor_serializes_each_context() {
        let executor = ThreadedExecutor::new().unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        for idx in 0..8 {
            let tx = done_tx.clone();
            executor.post(
                ExecutionContext::Script,
                "count",
                Box::new(move || {
                    let _ = tx.send(idx);
                }),
            );
        }
        let received: Vec<i32> = (0..8).map(|_| done_rx.recv().unwrap()).collect();
        assert_eq!(received, (0..8).collect::<Vec<_>>());
        assert!(!executor.runs_on(ExecutionContext::Ui));
    }

    #[test]
    fn threaded_executor_runs_delayed_tasks() {
        let executor = ThreadedExecutor::new().unwrap();
        let (tx, rx) = mpsc::channel();
        executor.post_delayed(
            ExecutionContext::Ui,
            "tick",
            Duration::from_millis(5),
            Box::new(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            }),
        );
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("rune-ui"));
    }

    #[test]
    fn threaded_delayed_tasks_fire_in_deadline_order() {
        let executor = ThreadedExecutor::new().unwrap();
        let (tx, rx) = mpsc::channel();
        for (label, millis) in [("late", 60), ("early", 5), ("middle", 30)] {
            let tx = tx.clone();
            executor.post_delayed(
                ExecutionContext::Script,
                label,
                Duration::from_millis(millis),
                Box::new(move || {
                    let _ = tx.send((label, thread::current().name().map(str::to_string)));
                }),
            );
        }
        let fired: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(
            fired.iter().map(|(label, _)| *label).collect::<Vec<_>>(),
            ["early", "middle", "late"]
        );
        assert!(fired.iter().all(|(_, thread)| thread.as_deref() == Some("rune-script")));
    }

    #[test]
    fn dropping_the_threaded_executor_discards_pending_delayed_tasks() {
        let executor = ThreadedExecutor::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        executor.post_delayed(
            ExecutionContext::Script,
            "never",
            Duration::from_secs(60),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        let started = Instant::now();
        drop(executor);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        );
    }
}
