//! FIFO of pending navigation intents.
//!
//! At most one intent is in flight: it stays at the head of the queue until its
//! asynchronous completion calls [`RouterTaskQueue::process_next`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RouterErrorCode;

/// Delivered once per push or replace with the outcome message and code.
pub type ErrorCallback = Arc<dyn Fn(&str, RouterErrorCode) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RouterMode {
    #[default]
    Standard,
    /// Retire the most recent page of the same url once the new one is visible.
    Single,
}

/// Destination of a navigation intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterTarget {
    /// Logical url, or the route name when `is_named_route` is set.
    pub url: String,
    pub mode: RouterMode,
    pub recoverable: bool,
    pub is_named_route: bool,
}

impl RouterTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RouterMode::Standard,
            recoverable: true,
            is_named_route: false,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            is_named_route: true,
            ..Self::new(name)
        }
    }

    pub fn with_mode(mut self, mode: RouterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }
}

#[derive(Clone)]
pub enum RouterIntent {
    Push {
        target: RouterTarget,
        params: String,
        on_error: Option<ErrorCallback>,
    },
    Replace {
        target: RouterTarget,
        params: String,
        on_error: Option<ErrorCallback>,
    },
    /// Empty url means the previous page.
    Back { target: RouterTarget, params: String },
    /// Back to a 1-based stack index, resolved when the intent is dispatched.
    BackToIndex { index: usize, params: String },
    Clear,
}

impl RouterIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            RouterIntent::Push { .. } => "push",
            RouterIntent::Replace { .. } => "replace",
            RouterIntent::Back { .. } => "back",
            RouterIntent::BackToIndex { .. } => "back_to_index",
            RouterIntent::Clear => "clear",
        }
    }
}

impl fmt::Debug for RouterIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterIntent::Push { target, params, on_error }
            | RouterIntent::Replace { target, params, on_error } => f
                .debug_struct(self.kind())
                .field("target", target)
                .field("params", params)
                .field("on_error", &on_error.is_some())
                .finish(),
            RouterIntent::Back { target, params } => f
                .debug_struct("back")
                .field("target", target)
                .field("params", params)
                .finish(),
            RouterIntent::BackToIndex { index, params } => f
                .debug_struct("back_to_index")
                .field("index", index)
                .field("params", params)
                .finish(),
            RouterIntent::Clear => f.write_str("clear"),
        }
    }
}

pub struct RouterTaskQueue {
    pending: Mutex<VecDeque<RouterIntent>>,
    capacity: usize,
}

impl RouterTaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Appends an intent. Returns it back when the queue was idle, in which case the
    /// caller must dispatch it right away. Intents beyond capacity are dropped.
    pub fn enqueue(&self, intent: RouterIntent) -> Option<RouterIntent> {
        let mut pending = self.pending.lock();
        if pending.len() >= self.capacity {
            warn!(
                kind = intent.kind(),
                depth = pending.len(),
                "router queue is full; navigation intent dropped"
            );
            return None;
        }
        let dispatch_now = pending.is_empty();
        debug!(kind = intent.kind(), depth = pending.len(), dispatch_now, "router intent queued");
        pending.push_back(intent.clone());
        dispatch_now.then_some(intent)
    }

    /// Retires the in-flight intent and returns the next one to dispatch.
    pub fn process_next(&self) -> Option<RouterIntent> {
        let mut pending = self.pending.lock();
        pending.pop_front();
        pending.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
