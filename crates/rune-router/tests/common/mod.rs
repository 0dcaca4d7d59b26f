#![allow(dead_code)]

use parking_lot::Mutex;
use rune_config::{ManifestConfig, RouterConfig};
use rune_router::{
    AlertOutcome, BuiltPage, DialogPresenter, DialogSpec, ErrorCallback, ListenerId,
    ManualExecutor, Navigator, PageCommands, PageId, PageLoadRequest, RenderCommand,
    RenderTree, RouterErrorCode, ScriptEngine, ScriptError, StaticManifest, TaskExecutor,
    TransitionEvent, TransitionListener,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared, ordered log of collaborator calls.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCall {
    Load(PageId, String),
    Destroy(PageId),
    Update(PageId),
    Show(PageId),
    Hide(PageId),
    ResetStaging,
}

pub struct FakeScript {
    journal: Journal,
    pub calls: Mutex<Vec<ScriptCall>>,
    failing: Mutex<HashSet<String>>,
    live: Mutex<HashMap<PageId, PageCommands>>,
    consume_back: AtomicBool,
}

impl FakeScript {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            live: Mutex::new(HashMap::new()),
            consume_back: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }

    pub fn consume_back(&self, consume: bool) {
        self.consume_back.store(consume, Ordering::SeqCst);
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ScriptCall::Load(_, url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<PageId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ScriptCall::Destroy(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &ScriptCall) -> usize {
        self.calls.lock().iter().filter(|call| *call == wanted).count()
    }

    /// Command buffer of a loaded page, for driving live re-renders.
    pub fn commands(&self, page_id: PageId) -> Option<PageCommands> {
        self.live.lock().get(&page_id).cloned()
    }
}

impl ScriptEngine for FakeScript {
    fn load_page(&self, request: &PageLoadRequest, commands: PageCommands) -> Result<(), ScriptError> {
        self.calls
            .lock()
            .push(ScriptCall::Load(request.page_id, request.url.clone()));
        self.journal.lock().push(format!("load {}", request.url));
        if self.failing.lock().contains(&request.url) {
            return Err(ScriptError::Execution(request.url.clone()));
        }
        commands.push(RenderCommand::new(
            "create",
            serde_json::json!({ "url": request.url, "main": request.is_main_page }),
        ));
        self.live.lock().insert(request.page_id, commands);
        Ok(())
    }

    fn destroy_page(&self, page_id: PageId) {
        self.live.lock().remove(&page_id);
        self.calls.lock().push(ScriptCall::Destroy(page_id));
    }

    fn update_page(&self, page_id: PageId) {
        self.calls.lock().push(ScriptCall::Update(page_id));
    }

    fn page_show(&self, page_id: PageId) {
        self.calls.lock().push(ScriptCall::Show(page_id));
    }

    fn page_hide(&self, page_id: PageId) {
        self.calls.lock().push(ScriptCall::Hide(page_id));
    }

    fn reset_staging_page(&self) {
        self.calls.lock().push(ScriptCall::ResetStaging);
    }

    fn back_press(&self, _page_id: PageId) -> bool {
        self.consume_back.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Push(PageId),
    Replace(PageId),
    Pop,
    PopTo(PageId),
    RestorePop(PageId),
    Clear,
    Finish,
    SinglePage(PageId),
    Update(PageId, usize),
}

type SharedListener = Arc<dyn Fn(TransitionEvent, Option<PageId>, Option<PageId>) + Send + Sync>;

pub struct FakeRender {
    journal: Journal,
    pub calls: Mutex<Vec<RenderCall>>,
    listeners: Mutex<Vec<(ListenerId, SharedListener)>>,
    next_listener: AtomicU64,
    pub allow_push: AtomicBool,
    pub allow_pop: AtomicBool,
    pub allow_replace: AtomicBool,
    pub allow_clear: AtomicBool,
    /// Report every transition end twice.
    pub double_fire: AtomicBool,
    node_info: Mutex<serde_json::Value>,
}

impl FakeRender {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            calls: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            allow_push: AtomicBool::new(true),
            allow_pop: AtomicBool::new(true),
            allow_replace: AtomicBool::new(true),
            allow_clear: AtomicBool::new(true),
            double_fire: AtomicBool::new(false),
            node_info: Mutex::new(serde_json::Value::Null),
        }
    }

    pub fn set_node_info(&self, info: serde_json::Value) {
        *self.node_info.lock() = info;
    }

    pub fn node_info(&self) -> serde_json::Value {
        self.node_info.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn count(&self, wanted: &RenderCall) -> usize {
        self.calls.lock().iter().filter(|call| *call == wanted).count()
    }

    fn fire(&self, event: TransitionEvent, incoming: Option<PageId>, outgoing: Option<PageId>) {
        let listeners: Vec<SharedListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        let times = if self.double_fire.load(Ordering::SeqCst) { 2 } else { 1 };
        for _ in 0..times {
            for listener in &listeners {
                listener(event, incoming, outgoing);
            }
        }
    }
}

impl RenderTree for FakeRender {
    fn can_push_page(&self) -> bool {
        self.allow_push.load(Ordering::SeqCst)
    }

    fn can_pop_page(&self) -> bool {
        self.allow_pop.load(Ordering::SeqCst)
    }

    fn can_replace_page(&self) -> bool {
        self.allow_replace.load(Ordering::SeqCst)
    }

    fn push_page(&self, page: BuiltPage) {
        self.journal.lock().push(format!("push {}", page.url));
        self.calls.lock().push(RenderCall::Push(page.page_id));
        self.fire(TransitionEvent::PushStart, Some(page.page_id), None);
        self.fire(TransitionEvent::PushEnd, Some(page.page_id), None);
    }

    fn replace_page(&self, page: BuiltPage, on_done: Box<dyn FnOnce() + Send>) {
        self.journal.lock().push(format!("replace {}", page.url));
        self.calls.lock().push(RenderCall::Replace(page.page_id));
        on_done();
    }

    fn pop_page(&self) {
        self.journal.lock().push("pop".to_string());
        self.calls.lock().push(RenderCall::Pop);
        self.fire(TransitionEvent::PopStart, None, None);
        self.fire(TransitionEvent::PopEnd, None, None);
    }

    fn pop_to_page(&self, page_id: PageId) {
        self.calls.lock().push(RenderCall::PopTo(page_id));
        self.fire(TransitionEvent::PopEnd, Some(page_id), None);
    }

    fn restore_pop_page(&self, page: BuiltPage) {
        self.calls.lock().push(RenderCall::RestorePop(page.page_id));
        self.fire(TransitionEvent::PushEnd, Some(page.page_id), None);
    }

    fn clear_invisible_pages(&self) -> bool {
        self.calls.lock().push(RenderCall::Clear);
        self.allow_clear.load(Ordering::SeqCst)
    }

    fn add_transition_listener(&self, listener: TransitionListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, Arc::from(listener)));
        id
    }

    fn remove_transition_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    fn set_single_page_id(&self, page_id: PageId) {
        self.calls.lock().push(RenderCall::SinglePage(page_id));
    }

    fn schedule_update(&self, page_id: PageId, commands: Vec<RenderCommand>) {
        self.calls.lock().push(RenderCall::Update(page_id, commands.len()));
    }

    fn finish(&self) {
        self.calls.lock().push(RenderCall::Finish);
    }

    fn restore_node_info(&self, info: serde_json::Value) {
        *self.node_info.lock() = info;
    }

    fn stored_node_info(&self) -> serde_json::Value {
        self.node_info.lock().clone()
    }
}

/// Answers every dialog immediately with a configurable outcome.
pub struct FakeDialogs {
    outcome: Mutex<AlertOutcome>,
    pub shown: Mutex<Vec<DialogSpec>>,
}

impl FakeDialogs {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(AlertOutcome::Cancel),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(&self, outcome: AlertOutcome) {
        *self.outcome.lock() = outcome;
    }
}

impl DialogPresenter for FakeDialogs {
    fn show_dialog(&self, dialog: &DialogSpec, on_outcome: Box<dyn FnOnce(AlertOutcome) + Send>) {
        self.shown.lock().push(dialog.clone());
        let outcome = *self.outcome.lock();
        on_outcome(outcome);
    }
}

pub const PAGES: &[&str] = &[
    "pages/index",
    "pages/a",
    "pages/b",
    "pages/c",
    "pages/d",
    "pages/detail",
    "pages/broken",
];

pub fn manifest_config() -> ManifestConfig {
    let mut config = ManifestConfig {
        pages: PAGES.iter().map(|page| page.to_string()).collect(),
        ..Default::default()
    };
    config
        .named_routes
        .insert("settings".into(), "pages/settings".into());
    config
}

pub struct Harness {
    pub journal: Journal,
    pub executor: Arc<ManualExecutor>,
    pub script: Arc<FakeScript>,
    pub render: Arc<FakeRender>,
    pub dialogs: Arc<FakeDialogs>,
    pub navigator: Navigator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let executor = Arc::new(ManualExecutor::new());
        let script = Arc::new(FakeScript::new(Arc::clone(&journal)));
        let render = Arc::new(FakeRender::new(Arc::clone(&journal)));
        let dialogs = Arc::new(FakeDialogs::new());
        let navigator = Navigator::builder()
            .executor(executor.clone() as Arc<dyn TaskExecutor>)
            .script_engine(script.clone())
            .render_tree(render.clone())
            .manifest(Arc::new(StaticManifest::new(&manifest_config())))
            .dialogs(dialogs.clone())
            .config(config)
            .build()
            .expect("all collaborators wired");
        Self {
            journal,
            executor,
            script,
            render,
            dialogs,
            navigator,
        }
    }

    pub fn settle(&self) {
        self.executor.run_until_idle();
    }

    /// Runs the entry page to completion.
    pub fn start(&self) {
        self.navigator.run_page("", "");
        self.settle();
    }

    pub fn push(&self, url: &str) {
        self.navigator.push(rune_router::RouterTarget::new(url), "");
        self.settle();
    }

    /// Stack urls, bottom first.
    pub fn urls(&self) -> Vec<String> {
        self.navigator
            .pages()
            .into_iter()
            .map(|page| page.url)
            .collect()
    }

    pub fn ids(&self) -> Vec<PageId> {
        self.navigator
            .pages()
            .into_iter()
            .map(|page| page.page_id)
            .collect()
    }
}

/// Error callback that records every delivered code.
pub fn code_recorder() -> (Arc<Mutex<Vec<RouterErrorCode>>>, ErrorCallback) {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&codes);
    let callback: ErrorCallback = Arc::new(move |_message: &str, code: RouterErrorCode| sink.lock().push(code));
    (codes, callback)
}

pub fn js(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|url| format!("{url}.js")).collect()
}
