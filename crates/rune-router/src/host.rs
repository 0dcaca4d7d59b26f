//! Collaborator interfaces the router drives.
//!
//! The router never renders or runs script itself. A host wires in a [`ScriptEngine`]
//! (runs on the script context), a [`RenderTree`] and a [`DialogPresenter`] (both called
//! on the UI context) and a [`RouteManifest`] lookup.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::page_id::PageId;

/// One command emitted by page script, expressed as JSON like the runtime's other
/// script bridges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCommand {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RenderCommand {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Receives every flushed command buffer of one page.
pub type FlushCallback = Arc<dyn Fn(Vec<RenderCommand>) + Send + Sync>;

/// Command buffer of a loading or live page.
///
/// The script engine records commands with [`PageCommands::push`]; [`PageCommands::flush`]
/// hands the ordered batch to the router. The first flush builds the page, later flushes
/// are applied as incremental updates.
#[derive(Clone)]
pub struct PageCommands {
    page_id: PageId,
    pending: Arc<Mutex<Vec<RenderCommand>>>,
    on_flush: FlushCallback,
}

impl PageCommands {
    pub fn new(page_id: PageId, on_flush: FlushCallback) -> Self {
        Self {
            page_id,
            pending: Arc::new(Mutex::new(Vec::new())),
            on_flush,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn push(&self, command: RenderCommand) {
        self.pending.lock().push(command);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drains the buffer and delivers it, in recording order.
    pub fn flush(&self) {
        let commands = std::mem::take(&mut *self.pending.lock());
        (self.on_flush)(commands);
    }
}

impl std::fmt::Debug for PageCommands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCommands")
            .field("page_id", &self.page_id)
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// What the script engine needs to load one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoadRequest {
    pub page_id: PageId,
    /// Resolved page script path.
    pub url: String,
    pub params: String,
    pub is_main_page: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("page script not found: {0}")]
    NotFound(String),
    #[error("page script failed: {0}")]
    Execution(String),
}

/// Page script runtime. Every method is invoked on the script context.
pub trait ScriptEngine: Send + Sync {
    /// Runs the page script. Commands go into `commands`; the router flushes once after
    /// this returns, the engine may flush again later for live re-renders.
    fn load_page(&self, request: &PageLoadRequest, commands: PageCommands) -> Result<(), ScriptError>;

    /// Releases all script-side state of a page.
    fn destroy_page(&self, page_id: PageId);

    /// The running page changed.
    fn update_page(&self, _page_id: PageId) {}

    fn page_show(&self, _page_id: PageId) {}

    fn page_hide(&self, _page_id: PageId) {}

    /// A loaded page was discarded before it became visible.
    fn reset_staging_page(&self) {}

    fn media_query_update(&self) {}

    /// Gives the running page a chance to consume a system back press.
    fn back_press(&self, _page_id: PageId) -> bool {
        false
    }
}

/// Page handed to the render tree for a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPage {
    pub page_id: PageId,
    pub url: String,
    pub commands: Vec<RenderCommand>,
}

/// Transition progress reported by the render tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionEvent {
    PushStart,
    PushEnd,
    PopStart,
    PopEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Called with the event, the incoming page and the outgoing page.
pub type TransitionListener =
    Box<dyn Fn(TransitionEvent, Option<PageId>, Option<PageId>) + Send + Sync>;

/// Render-tree lifecycle surface. Every method is invoked on the UI context.
pub trait RenderTree: Send + Sync {
    fn can_push_page(&self) -> bool;
    fn can_pop_page(&self) -> bool;
    fn can_replace_page(&self) -> bool;

    fn push_page(&self, page: BuiltPage);
    /// `on_done` runs once the replacement is on screen.
    fn replace_page(&self, page: BuiltPage, on_done: Box<dyn FnOnce() + Send>);
    fn pop_page(&self);
    fn pop_to_page(&self, page_id: PageId);
    fn restore_pop_page(&self, page: BuiltPage);
    /// Drops every page below the top. `false` refuses the request.
    fn clear_invisible_pages(&self) -> bool;

    fn add_transition_listener(&self, listener: TransitionListener) -> ListenerId;
    fn remove_transition_listener(&self, id: ListenerId);

    /// The page of the same url that a SINGLE-mode push will retire.
    fn set_single_page_id(&self, _page_id: PageId) {}
    fn schedule_update(&self, _page_id: PageId, _commands: Vec<RenderCommand>) {}
    fn set_accessibility_root(&self, _page_id: PageId) {}
    fn flush_focus(&self) {}
    /// The last page was popped.
    fn finish(&self) {}

    fn restore_node_info(&self, _info: serde_json::Value) {}
    fn stored_node_info(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Maps logical urls to page script paths.
pub trait RouteManifest: Send + Sync {
    /// Script path for `url`, `None` when the url is not registered.
    fn page_path(&self, url: &str) -> Option<String>;

    /// Logical url of the entry page.
    fn entry(&self) -> Option<String>;

    fn named_route_path(&self, _name: &str) -> Option<String> {
        None
    }

    fn named_router_info(&self) -> Option<serde_json::Value> {
        None
    }

    fn restore_named_router_info(&self, _info: serde_json::Value) {}

    fn full_path_info(&self) -> Option<serde_json::Value> {
        None
    }

    fn restore_full_path_info(&self, _info: serde_json::Value) {}
}

/// Answer to a leave-confirmation dialog, also delivered to leave interceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AlertOutcome {
    Cancel = 0,
    Confirm = 1,
    /// The interceptor was dropped without a decision.
    Recovery = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogButton {
    pub text: String,
}

/// Properties of the dialog shown before leaving a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogSpec {
    pub message: String,
    pub auto_cancel: bool,
    pub buttons: Vec<DialogButton>,
}

impl DialogSpec {
    pub fn leave_confirmation(
        message: impl Into<String>,
        cancel: impl Into<String>,
        confirm: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            auto_cancel: false,
            buttons: vec![
                DialogButton {
                    text: cancel.into(),
                },
                DialogButton {
                    text: confirm.into(),
                },
            ],
        }
    }
}

/// Shows dialogs on the UI context.
pub trait DialogPresenter: Send + Sync {
    fn show_dialog(&self, dialog: &DialogSpec, on_outcome: Box<dyn FnOnce(AlertOutcome) + Send>);
}
