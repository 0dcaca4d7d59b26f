//! Collaborators that log instead of running script or drawing.

use parking_lot::Mutex;
use rune_router::{
    AlertOutcome, BuiltPage, DialogPresenter, DialogSpec, ListenerId, PageCommands, PageId,
    PageLoadRequest, RenderCommand, RenderTree, ScriptEngine, ScriptError, TransitionEvent,
    TransitionListener,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ConsoleScript;

impl ScriptEngine for ConsoleScript {
    fn load_page(&self, request: &PageLoadRequest, commands: PageCommands) -> Result<(), ScriptError> {
        log::info!(
            "script: load {} as page {} (params {:?}, main {})",
            request.url, request.page_id, request.params, request.is_main_page
        );
        commands.push(RenderCommand::new("createBody", json!({ "tag": "div" })));
        commands.push(RenderCommand::new(
            "addElement",
            json!({ "parent": 0, "tag": "text", "value": request.url }),
        ));
        Ok(())
    }

    fn destroy_page(&self, page_id: PageId) {
        log::info!("script: destroy page {page_id}");
    }

    fn page_show(&self, page_id: PageId) {
        log::debug!("script: show page {page_id}");
    }

    fn page_hide(&self, page_id: PageId) {
        log::debug!("script: hide page {page_id}");
    }
}

type SharedListener = Arc<dyn Fn(TransitionEvent, Option<PageId>, Option<PageId>) + Send + Sync>;

/// Finishes every transition immediately.
#[derive(Default)]
pub struct ConsoleRender {
    listeners: Mutex<Vec<(ListenerId, SharedListener)>>,
    next_listener: AtomicU64,
    node_info: Mutex<serde_json::Value>,
}

impl ConsoleRender {
    fn fire(&self, event: TransitionEvent, incoming: Option<PageId>) {
        let listeners: Vec<SharedListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event, incoming, None);
        }
    }
}

impl RenderTree for ConsoleRender {
    fn can_push_page(&self) -> bool {
        true
    }

    fn can_pop_page(&self) -> bool {
        true
    }

    fn can_replace_page(&self) -> bool {
        true
    }

    fn push_page(&self, page: BuiltPage) {
        log::info!("render: push {} ({} commands)", page.url, page.commands.len());
        *self.node_info.lock() = json!({ "focused": page.page_id.0 });
        self.fire(TransitionEvent::PushEnd, Some(page.page_id));
    }

    fn replace_page(&self, page: BuiltPage, on_done: Box<dyn FnOnce() + Send>) {
        log::info!("render: replace with {}", page.url);
        on_done();
    }

    fn pop_page(&self) {
        log::info!("render: pop");
        self.fire(TransitionEvent::PopEnd, None);
    }

    fn pop_to_page(&self, page_id: PageId) {
        log::info!("render: pop to page {page_id}");
        self.fire(TransitionEvent::PopEnd, Some(page_id));
    }

    fn restore_pop_page(&self, page: BuiltPage) {
        log::info!("render: restore {} under the current page", page.url);
        self.fire(TransitionEvent::PushEnd, Some(page.page_id));
    }

    fn clear_invisible_pages(&self) -> bool {
        log::info!("render: clear invisible pages");
        true
    }

    fn add_transition_listener(&self, listener: TransitionListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::from(listener)));
        id
    }

    fn remove_transition_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    fn set_single_page_id(&self, page_id: PageId) {
        log::info!("render: page {page_id} will be retired");
    }

    fn finish(&self) {
        log::info!("render: last page closed");
    }

    fn stored_node_info(&self) -> serde_json::Value {
        self.node_info.lock().clone()
    }
}

/// Confirms every dialog.
pub struct ConsoleDialogs;

impl DialogPresenter for ConsoleDialogs {
    fn show_dialog(&self, dialog: &DialogSpec, on_outcome: Box<dyn FnOnce(AlertOutcome) + Send>) {
        let buttons: Vec<&str> = dialog.buttons.iter().map(|b| b.text.as_str()).collect();
        log::info!("dialog: {:?} {:?} -> confirm", dialog.message, buttons);
        on_outcome(AlertOutcome::Confirm);
    }
}
