//! Script timers keyed by callback id.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::context::{ExecutionContext, TaskExecutor};

/// Fired on the script context with the callback id, the delay and whether the timer
/// repeats. Interval timers re-arm by calling `wait_timer` again with `is_first = false`.
pub type TimerCallback = Arc<dyn Fn(&str, Duration, bool) + Send + Sync>;

pub struct TimerRegistry {
    executor: Arc<dyn TaskExecutor>,
    callback: TimerCallback,
    armed: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl TimerRegistry {
    pub fn new(executor: Arc<dyn TaskExecutor>, callback: TimerCallback) -> Self {
        Self {
            executor,
            callback,
            armed: Mutex::new(HashMap::new()),
        }
    }

    /// Arms `callback_id`. A re-arm (`is_first == false`) of a cleared timer is ignored.
    pub fn wait_timer(&self, callback_id: &str, delay: Duration, is_interval: bool, is_first: bool) {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut armed = self.armed.lock();
            if !is_first && !armed.contains_key(callback_id) {
                debug!(callback_id, "timer was cleared; not re-arming");
                return;
            }
            if let Some(previous) = armed.insert(callback_id.to_string(), Arc::clone(&cancelled)) {
                previous.store(true, Ordering::SeqCst);
            }
        }

        let callback = Arc::clone(&self.callback);
        let id = callback_id.to_string();
        self.executor.post_delayed(
            ExecutionContext::Script,
            "RuneWaitTimer",
            delay,
            Box::new(move || {
                if !cancelled.load(Ordering::SeqCst) {
                    callback(&id, delay, is_interval);
                }
            }),
        );
    }

    pub fn clear_timer(&self, callback_id: &str) {
        match self.armed.lock().remove(callback_id) {
            Some(cancelled) => cancelled.store(true, Ordering::SeqCst),
            None => warn!(callback_id, "clear_timer: no such timer"),
        }
    }

    pub fn is_armed(&self, callback_id: &str) -> bool {
        self.armed.lock().contains_key(callback_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualExecutor;

    fn registry() -> (Arc<ManualExecutor>, Arc<Mutex<Vec<String>>>, TimerRegistry) {
        let executor = Arc::new(ManualExecutor::new());
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let timers = TimerRegistry::new(
            executor.clone(),
            Arc::new(move |id: &str, _delay: Duration, _interval: bool| sink.lock().push(id.to_string())),
        );
        (executor, fired, timers)
    }

    #[test]
    fn fires_after_its_delay() {
        let (executor, fired, timers) = registry();
        timers.wait_timer("t1", Duration::from_millis(100), false, true);
        executor.advance(Duration::from_millis(99));
        assert!(fired.lock().is_empty());
        executor.advance(Duration::from_millis(1));
        assert_eq!(*fired.lock(), ["t1"]);
    }

    #[test]
    fn cleared_timers_never_fire_or_rearm() {
        let (executor, fired, timers) = registry();
        timers.wait_timer("t1", Duration::from_millis(10), true, true);
        timers.clear_timer("t1");
        assert!(!timers.is_armed("t1"));
        timers.wait_timer("t1", Duration::from_millis(10), true, false);
        executor.advance(Duration::from_millis(50));
        assert!(fired.lock().is_empty());
    }

    #[test]
    fn rearming_replaces_the_pending_fire() {
        let (executor, fired, timers) = registry();
        timers.wait_timer("t1", Duration::from_millis(10), true, true);
        timers.wait_timer("t1", Duration::from_millis(30), true, false);
        executor.advance(Duration::from_millis(20));
        assert!(fired.lock().is_empty());
        executor.advance(Duration::from_millis(10));
        assert_eq!(*fired.lock(), ["t1"]);
    }
}
