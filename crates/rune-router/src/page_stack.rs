//! Ordered stack of page records.
//!
//! The bottom record is the first page. The stack also owns the page id to instance map
//! and per-page params. It does no locking itself; the coordinator keeps it behind a
//! single mutex.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::host::{AlertOutcome, DialogSpec};
use crate::page::PageHandle;
use crate::page_id::PageId;

/// Invoked with the dialog outcome, or with [`AlertOutcome::Recovery`] when the
/// interceptor is dropped undecided.
pub type LeaveInterceptor = Arc<dyn Fn(AlertOutcome) + Send + Sync>;

#[derive(Clone)]
pub struct PageRecord {
    pub page_id: PageId,
    /// Resolved script path.
    pub url: String,
    /// Restored from a snapshot and not yet realized.
    pub is_restore: bool,
    pub recoverable: bool,
    pub is_named_route: bool,
    pub leave_interceptor: Option<LeaveInterceptor>,
    pub pending_dialog: Option<DialogSpec>,
}

impl PageRecord {
    pub fn new(page_id: PageId, url: impl Into<String>) -> Self {
        Self {
            page_id,
            url: url.into(),
            is_restore: false,
            recoverable: true,
            is_named_route: false,
            leave_interceptor: None,
            pending_dialog: None,
        }
    }

    pub fn restored(page_id: PageId, url: impl Into<String>) -> Self {
        Self {
            is_restore: true,
            ..Self::new(page_id, url)
        }
    }

    /// Drops the leave interceptor, telling it no decision will come.
    pub fn release_interceptor(&mut self) {
        self.pending_dialog = None;
        if let Some(interceptor) = self.leave_interceptor.take() {
            interceptor(AlertOutcome::Recovery);
        }
    }
}

impl fmt::Debug for PageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRecord")
            .field("page_id", &self.page_id)
            .field("url", &self.url)
            .field("is_restore", &self.is_restore)
            .field("recoverable", &self.recoverable)
            .field("is_named_route", &self.is_named_route)
            .field("leave_interceptor", &self.leave_interceptor.is_some())
            .finish()
    }
}

/// Callback-free view of a record for read-only queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub page_id: PageId,
    pub url: String,
    pub is_restore: bool,
    pub recoverable: bool,
    pub is_named_route: bool,
    pub has_leave_interceptor: bool,
}

impl From<&PageRecord> for PageSummary {
    fn from(record: &PageRecord) -> Self {
        Self {
            page_id: record.page_id,
            url: record.url.clone(),
            is_restore: record.is_restore,
            recoverable: record.recoverable,
            is_named_route: record.is_named_route,
            has_leave_interceptor: record.leave_interceptor.is_some(),
        }
    }
}

pub struct PageStack {
    records: Vec<PageRecord>,
    instances: HashMap<PageId, PageHandle>,
    params: HashMap<PageId, String>,
    active_params: Option<PageId>,
    capacity: usize,
    full: bool,
}

impl PageStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            instances: HashMap::new(),
            params: HashMap::new(),
            active_params: None,
            capacity: capacity.max(1),
            full: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set once the stack reaches capacity; cleared by any removal.
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a record. Returns `true` when this push filled the stack.
    pub fn push(&mut self, record: PageRecord) -> bool {
        self.records.push(record);
        if self.records.len() >= self.capacity && !self.full {
            self.full = true;
            return true;
        }
        false
    }

    pub fn pop(&mut self) -> Option<PageRecord> {
        let record = self.records.pop()?;
        self.forget(record.page_id);
        self.full = false;
        Some(record)
    }

    /// Swaps the top record, returning the old one. Pushes when the stack is empty.
    pub fn replace_top(&mut self, record: PageRecord) -> Option<PageRecord> {
        let old = self.records.pop();
        if let Some(old) = &old {
            self.forget(old.page_id);
        }
        self.push(record);
        old
    }

    /// Removes every record below the top.
    pub fn clear(&mut self) -> Vec<PageRecord> {
        let keep = self.records.len().saturating_sub(1);
        let removed: Vec<PageRecord> = self.records.drain(..keep).collect();
        for record in &removed {
            self.forget(record.page_id);
        }
        if !removed.is_empty() {
            self.full = false;
        }
        removed
    }

    /// Pops every record above the 1-based `index`, which becomes the top.
    pub fn pop_to_index(&mut self, index: usize) -> Vec<PageRecord> {
        if index == 0 || index >= self.records.len() {
            return Vec::new();
        }
        let removed: Vec<PageRecord> = self.records.drain(index..).collect();
        for record in &removed {
            self.forget(record.page_id);
        }
        self.full = false;
        removed
    }

    /// 1-based position of the record holding `page_id`.
    pub fn position_of(&self, page_id: PageId) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.page_id == page_id)
            .map(|idx| idx + 1)
    }

    /// 1-based position of the most recent record of `url`.
    pub fn position_by_url(&self, url: &str) -> Option<usize> {
        self.records
            .iter()
            .rposition(|record| record.url == url)
            .map(|idx| idx + 1)
    }

    /// Most recent record of `url`: its id and whether it is still unrealized.
    pub fn find_by_url(&self, url: &str) -> Option<(PageId, bool)> {
        self.records
            .iter()
            .rev()
            .find(|record| record.url == url)
            .map(|record| (record.page_id, record.is_restore))
    }

    /// 0-based position of the oldest record of `url`.
    pub fn index_of_url(&self, url: &str) -> Option<usize> {
        self.records.iter().position(|record| record.url == url)
    }

    /// Removes the record a SINGLE-mode push retired, unless it is the top.
    pub fn recycle_if_single_mode(&mut self, retired: PageId) -> Option<PageRecord> {
        let pos = self.records.iter().position(|record| record.page_id == retired)?;
        if pos + 1 == self.records.len() {
            return None;
        }
        let record = self.records.remove(pos);
        self.forget(record.page_id);
        self.full = false;
        Some(record)
    }

    pub fn top(&self) -> Option<&PageRecord> {
        self.records.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut PageRecord> {
        self.records.last_mut()
    }

    /// Record at a 1-based index.
    pub fn get(&self, index: usize) -> Option<&PageRecord> {
        index.checked_sub(1).and_then(|idx| self.records.get(idx))
    }

    pub fn records(&self) -> &[PageRecord] {
        &self.records
    }

    pub fn summaries(&self) -> Vec<PageSummary> {
        self.records.iter().map(PageSummary::from).collect()
    }

    pub fn attach(&mut self, page_id: PageId, handle: PageHandle) {
        self.instances.insert(page_id, handle);
    }

    pub fn instance(&self, page_id: PageId) -> Option<PageHandle> {
        self.instances.get(&page_id).copied()
    }

    pub fn set_params(&mut self, page_id: PageId, params: impl Into<String>) {
        self.params.insert(page_id, params.into());
    }

    pub fn params(&self, page_id: PageId) -> Option<&str> {
        self.params.get(&page_id).map(String::as_str)
    }

    /// Page whose params answer `get_params`.
    pub fn set_active_params(&mut self, page_id: PageId) {
        self.active_params = Some(page_id);
    }

    pub fn active_params(&self) -> Option<&str> {
        self.active_params.and_then(|id| self.params(id))
    }

    /// Drops params and instance bookkeeping of an id that never reached the stack.
    pub fn forget(&mut self, page_id: PageId) {
        self.instances.remove(&page_id);
        self.params.remove(&page_id);
        if self.active_params == Some(page_id) {
            self.active_params = None;
        }
    }
}
