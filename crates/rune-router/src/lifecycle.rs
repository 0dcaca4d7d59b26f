//! Page lifecycle coordinator.
//!
//! Drives one navigation intent at a time through resolve, script load, command flush,
//! render transition and completion. Each step runs as a [`LifecycleEvent`] posted to the
//! script or UI context. Completion callbacks hold a `Weak` back-reference and a
//! [`PageHandle`], so they are dropped once the router or the page is gone.
//!
//! Every intent that gets dispatched ends in exactly one
//! `process_next`, whether it completes or is abandoned.

use parking_lot::{Mutex, MutexGuard};
use rune_config::RouterConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

use crate::context::{ExecutionContext, TaskExecutor};
use crate::error::{Result, RouterError, RouterErrorCode};
use crate::host::{
    AlertOutcome, BuiltPage, DialogPresenter, DialogSpec, ListenerId, PageCommands,
    PageLoadRequest, RenderCommand, RenderTree, RouteManifest, ScriptEngine, TransitionEvent,
};
use crate::page::{LifecycleState, LoadPurpose, PageArena, PageHandle, PageInstance};
use crate::page_id::{PageId, PageIdAllocator};
use crate::page_stack::{LeaveInterceptor, PageRecord, PageStack};
use crate::snapshot::{RestoreKind, RouterRecoverRecord, Snapshot, StackEntry};
use crate::task_queue::{ErrorCallback, RouterIntent, RouterMode, RouterTarget, RouterTaskQueue};

/// Everything the coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn TaskExecutor>,
    pub script: Arc<dyn ScriptEngine>,
    pub render: Arc<dyn RenderTree>,
    pub manifest: Arc<dyn RouteManifest>,
    pub dialogs: Arc<dyn DialogPresenter>,
}

/// Which completion a transition listener is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransitionKind {
    Push,
    Pop,
    PopTo { page_id: PageId },
    Restore,
}

impl TransitionKind {
    fn completes_on(&self, event: TransitionEvent) -> bool {
        match self {
            TransitionKind::Push | TransitionKind::Restore => event == TransitionEvent::PushEnd,
            TransitionKind::Pop | TransitionKind::PopTo { .. } => event == TransitionEvent::PopEnd,
        }
    }
}

/// Where a back navigation lands.
#[derive(Debug, Clone)]
pub(crate) enum BackTarget {
    /// The page right under the current one.
    Previous,
    /// The most recent page of a url.
    Url(RouterTarget),
    /// The page at a 1-based stack position.
    Index(usize),
}

/// One step of the navigation state machine.
pub(crate) enum LifecycleEvent {
    Dispatch(RouterIntent),
    LoadScript(PageHandle),
    CommandsFlushed {
        page: PageHandle,
        commands: Vec<RenderCommand>,
    },
    PageReady {
        page: PageHandle,
        commands: Vec<RenderCommand>,
    },
    LoadFinished,
    Transition {
        page: PageHandle,
        kind: TransitionKind,
        event: TransitionEvent,
    },
    ReplaceFinished(PageHandle),
    PopPage,
    PopToPage(PageId),
    ClearInvisiblePages,
    ShowLeaveDialog {
        dialog: DialogSpec,
        interceptor: LeaveInterceptor,
    },
    LeaveDecided {
        outcome: AlertOutcome,
        interceptor: LeaveInterceptor,
    },
    ApplyUpdate {
        page_id: PageId,
        commands: Vec<RenderCommand>,
    },
    SetCurrentPage(PageId),
    PageShow(PageId),
    PageHide(PageId),
    MediaQueryUpdate,
    DestroyPage {
        page_id: PageId,
        recycle_id: bool,
    },
    ResetStagingPage,
}

impl LifecycleEvent {
    fn context(&self) -> ExecutionContext {
        match self {
            LifecycleEvent::Dispatch(_)
            | LifecycleEvent::LoadScript(_)
            | LifecycleEvent::CommandsFlushed { .. }
            | LifecycleEvent::LeaveDecided { .. }
            | LifecycleEvent::SetCurrentPage(_)
            | LifecycleEvent::PageShow(_)
            | LifecycleEvent::PageHide(_)
            | LifecycleEvent::MediaQueryUpdate
            | LifecycleEvent::DestroyPage { .. }
            | LifecycleEvent::ResetStagingPage => ExecutionContext::Script,
            LifecycleEvent::PageReady { .. }
            | LifecycleEvent::LoadFinished
            | LifecycleEvent::Transition { .. }
            | LifecycleEvent::ReplaceFinished(_)
            | LifecycleEvent::PopPage
            | LifecycleEvent::PopToPage(_)
            | LifecycleEvent::ClearInvisiblePages
            | LifecycleEvent::ShowLeaveDialog { .. }
            | LifecycleEvent::ApplyUpdate { .. } => ExecutionContext::Ui,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Dispatch(_) => "RouterDispatch",
            LifecycleEvent::LoadScript(_) => "RouterLoadScript",
            LifecycleEvent::CommandsFlushed { .. } => "RouterCommandsFlushed",
            LifecycleEvent::PageReady { .. } => "RouterPageReady",
            LifecycleEvent::LoadFinished => "RouterLoadFinished",
            LifecycleEvent::Transition { .. } => "RouterTransition",
            LifecycleEvent::ReplaceFinished(_) => "RouterReplaceFinished",
            LifecycleEvent::PopPage => "RouterPopPage",
            LifecycleEvent::PopToPage(_) => "RouterPopToPage",
            LifecycleEvent::ClearInvisiblePages => "RouterClearInvisiblePages",
            LifecycleEvent::ShowLeaveDialog { .. } => "RouterShowLeaveDialog",
            LifecycleEvent::LeaveDecided { .. } => "RouterLeaveDecided",
            LifecycleEvent::ApplyUpdate { .. } => "RouterApplyUpdate",
            LifecycleEvent::SetCurrentPage(_) => "RouterSetCurrentPage",
            LifecycleEvent::PageShow(_) => "RouterPageShow",
            LifecycleEvent::PageHide(_) => "RouterPageHide",
            LifecycleEvent::MediaQueryUpdate => "RouterMediaQueryUpdate",
            LifecycleEvent::DestroyPage { .. } => "RouterDestroyPage",
            LifecycleEvent::ResetStagingPage => "RouterResetStagingPage",
        }
    }
}

pub struct PageLifecycleCoordinator {
    me: Weak<PageLifecycleCoordinator>,
    parts: Collaborators,
    config: RouterConfig,
    ids: PageIdAllocator,
    queue: RouterTaskQueue,
    stack: Mutex<PageStack>,
    arena: Mutex<PageArena>,
    staging: AtomicBool,
    single_page: Mutex<Option<PageId>>,
    listener: Mutex<Option<ListenerId>>,
    pending_back: Mutex<Option<(BackTarget, String)>>,
    phase: Mutex<LifecycleState>,
}

impl PageLifecycleCoordinator {
    pub fn new(parts: Collaborators, config: RouterConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            queue: RouterTaskQueue::new(config.max_queue_depth),
            stack: Mutex::new(PageStack::new(config.max_stack_size)),
            parts,
            config,
            ids: PageIdAllocator::new(),
            arena: Mutex::new(PageArena::new()),
            staging: AtomicBool::new(false),
            single_page: Mutex::new(None),
            listener: Mutex::new(None),
            pending_back: Mutex::new(None),
            phase: Mutex::new(LifecycleState::Idle),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.parts
    }

    pub fn ids(&self) -> &PageIdAllocator {
        &self.ids
    }

    pub fn queue(&self) -> &RouterTaskQueue {
        &self.queue
    }

    pub(crate) fn stack(&self) -> MutexGuard<'_, PageStack> {
        self.stack.lock()
    }

    /// Progress of the intent in flight; `Idle` when the queue is drained.
    pub fn phase(&self) -> LifecycleState {
        *self.phase.lock()
    }

    pub fn is_staging(&self) -> bool {
        self.staging.load(Ordering::SeqCst)
    }

    /// Number of live page instances, loading pages included.
    pub fn live_instances(&self) -> usize {
        self.arena.lock().len()
    }

    /// Queues an intent and dispatches it right away if nothing is in flight.
    pub fn submit(&self, intent: RouterIntent) {
        if let Some(intent) = self.queue.enqueue(intent) {
            self.dispatch(intent);
        }
    }

    pub(crate) fn post(&self, event: LifecycleEvent) {
        let me = self.me.clone();
        let context = event.context();
        let name = event.name();
        self.parts.executor.post(
            context,
            name,
            Box::new(move || match me.upgrade() {
                Some(coordinator) => coordinator.handle(event),
                None => trace!(task = name, "router gone; task dropped"),
            }),
        );
    }

    pub(crate) fn handle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Dispatch(intent) => self.dispatch(intent),
            LifecycleEvent::LoadScript(page) => self.load_script(page),
            LifecycleEvent::CommandsFlushed { page, commands } => {
                self.on_commands_flushed(page, commands)
            }
            LifecycleEvent::PageReady { page, commands } => self.on_page_ready(page, commands),
            LifecycleEvent::LoadFinished => self.parts.render.flush_focus(),
            LifecycleEvent::Transition { page, kind, event } => {
                self.on_transition(page, kind, event)
            }
            LifecycleEvent::ReplaceFinished(page) => self.on_replace_finished(page),
            LifecycleEvent::PopPage => self.pop_page(),
            LifecycleEvent::PopToPage(page_id) => self.pop_to_page(page_id),
            LifecycleEvent::ClearInvisiblePages => self.clear_invisible_pages(),
            LifecycleEvent::ShowLeaveDialog {
                dialog,
                interceptor,
            } => self.show_leave_dialog(dialog, interceptor),
            LifecycleEvent::LeaveDecided {
                outcome,
                interceptor,
            } => self.on_leave_decided(outcome, interceptor),
            LifecycleEvent::ApplyUpdate { page_id, commands } => {
                if self.stack.lock().instance(page_id).is_some() {
                    self.parts.render.schedule_update(page_id, commands);
                } else {
                    debug!(%page_id, "update for a page not on the stack dropped");
                }
            }
            LifecycleEvent::SetCurrentPage(page_id) => self.parts.script.update_page(page_id),
            LifecycleEvent::PageShow(page_id) => self.parts.script.page_show(page_id),
            LifecycleEvent::PageHide(page_id) => self.parts.script.page_hide(page_id),
            LifecycleEvent::MediaQueryUpdate => self.parts.script.media_query_update(),
            LifecycleEvent::DestroyPage {
                page_id,
                recycle_id,
            } => self.destroy_page(page_id, recycle_id),
            LifecycleEvent::ResetStagingPage => self.parts.script.reset_staging_page(),
        }
    }

    fn set_phase(&self, next: LifecycleState) {
        let mut phase = self.phase.lock();
        if !phase.can_advance_to(next) && *phase != next {
            debug!(from = ?*phase, to = ?next, "unexpected router phase change");
        }
        *phase = next;
    }

    /// Retires the intent in flight and dispatches the next one on the script context.
    pub(crate) fn process_next(&self) {
        self.set_phase(LifecycleState::Idle);
        if let Some(next) = self.queue.process_next() {
            debug!(kind = next.kind(), "dispatching next router intent");
            self.post(LifecycleEvent::Dispatch(next));
        }
    }

    fn dispatch(&self, intent: RouterIntent) {
        debug!(?intent, "router intent");
        match intent {
            RouterIntent::Push {
                target,
                params,
                on_error,
            } => self.start_push(target, params, on_error),
            RouterIntent::Replace {
                target,
                params,
                on_error,
            } => self.start_replace(target, params, on_error),
            RouterIntent::Back { target, params } => {
                let target = if target.url.is_empty() {
                    BackTarget::Previous
                } else {
                    BackTarget::Url(target)
                };
                self.back_check_alert(target, params)
            }
            RouterIntent::BackToIndex { index, params } => {
                let len = self.stack.lock().len();
                if index == 0 || index > len {
                    warn!(index, len, "back to an index outside the page stack");
                    self.process_next();
                } else if index == len {
                    info!(index, "back to the current page ignored");
                    self.process_next();
                } else {
                    self.back_check_alert(BackTarget::Index(index), params)
                }
            }
            RouterIntent::Clear => self.post(LifecycleEvent::ClearInvisiblePages),
        }
    }

    fn resolve(&self, target: &RouterTarget) -> Option<String> {
        if target.is_named_route {
            self.parts.manifest.named_route_path(&target.url)
        } else {
            self.parts.manifest.page_path(&target.url)
        }
    }

    fn report(on_error: &Option<ErrorCallback>, code: RouterErrorCode) {
        if let Some(callback) = on_error {
            callback(code.message(), code);
        }
    }

    fn start_push(&self, target: RouterTarget, params: String, on_error: Option<ErrorCallback>) {
        self.set_phase(LifecycleState::Resolving);
        if target.url.is_empty() {
            warn!("push with an empty url ignored");
            self.process_next();
            return;
        }
        if self.stack.lock().is_full() {
            warn!(url = %target.url, capacity = self.config.max_stack_size, "page stack is full; push rejected");
            Self::report(&on_error, RouterErrorCode::PageStackFull);
            self.process_next();
            return;
        }
        let Some(path) = self.resolve(&target) else {
            warn!(url = %target.url, "push to an unknown url");
            Self::report(&on_error, RouterErrorCode::UriError);
            self.process_next();
            return;
        };

        let page_id = self.ids.allocate();
        let resolved = RouterTarget { url: path, ..target };
        match self.load_page(page_id, resolved, params, LoadPurpose::Push) {
            Ok(()) => Self::report(&on_error, RouterErrorCode::NoError),
            Err(_) => Self::report(&on_error, RouterErrorCode::InternalError),
        }
    }

    fn start_replace(&self, target: RouterTarget, params: String, on_error: Option<ErrorCallback>) {
        self.set_phase(LifecycleState::Resolving);
        if target.url.is_empty() {
            warn!("replace with an empty url ignored");
            self.process_next();
            return;
        }
        let Some(path) = self.resolve(&target) else {
            warn!(url = %target.url, "replace with an unknown url");
            Self::report(&on_error, RouterErrorCode::UriErrorLite);
            self.process_next();
            return;
        };

        let page_id = self.ids.allocate();
        let resolved = RouterTarget { url: path, ..target };
        match self.load_page(page_id, resolved, params, LoadPurpose::Replace) {
            Ok(()) => Self::report(&on_error, RouterErrorCode::NoError),
            Err(_) => Self::report(&on_error, RouterErrorCode::InternalError),
        }
    }

    /// Stages a page instance and schedules its script. On error the intent has already
    /// been abandoned.
    fn load_page(
        &self,
        page_id: Option<PageId>,
        target: RouterTarget,
        params: String,
        purpose: LoadPurpose,
    ) -> Result<()> {
        let Some(page_id) = page_id else {
            warn!(url = %target.url, "page id pool exhausted; navigation abandoned");
            self.process_next();
            return Err(RouterError::InvalidPageId);
        };
        let fresh_id = purpose != LoadPurpose::Restore;

        if self.staging.swap(true, Ordering::SeqCst) {
            warn!(url = %target.url, "another page is still loading; navigation abandoned");
            if fresh_id {
                self.ids.recycle(page_id);
            }
            self.process_next();
            return Err(RouterError::StagingPageExist);
        }

        let is_main = {
            let mut stack = self.stack.lock();
            stack.set_params(page_id, params.clone());
            stack.set_active_params(page_id);
            let retired = match target.mode {
                RouterMode::Single => stack.find_by_url(&target.url).map(|(id, _)| id),
                RouterMode::Standard => None,
            };
            *self.single_page.lock() = retired;
            stack.is_empty()
        };

        let mut instance = PageInstance::new(page_id, target.url.clone(), params, purpose);
        instance.is_main = is_main;
        instance.recoverable = target.recoverable;
        instance.is_named_route = target.is_named_route;
        let handle = self.arena.lock().insert(instance);

        info!(%page_id, url = %target.url, ?purpose, is_main, "loading page");
        self.set_phase(LifecycleState::ScriptLoading);
        self.post(LifecycleEvent::LoadScript(handle));
        Ok(())
    }

    fn load_script(&self, handle: PageHandle) {
        let me = self.me.clone();
        let prepared = self.arena.lock().get_mut(handle).map(|page| {
            let commands = PageCommands::new(
                page.page_id,
                Arc::new(move |commands: Vec<RenderCommand>| {
                    if let Some(coordinator) = me.upgrade() {
                        coordinator.post(LifecycleEvent::CommandsFlushed {
                            page: handle,
                            commands,
                        });
                    }
                }),
            );
            page.commands = Some(commands.clone());
            let request = PageLoadRequest {
                page_id: page.page_id,
                url: page.url.clone(),
                params: page.params.clone(),
                is_main_page: page.is_main,
            };
            (request, commands)
        });
        let Some((request, commands)) = prepared else {
            warn!("staged page vanished before its script ran");
            self.abandon_staging(None);
            return;
        };

        match self.parts.script.load_page(&request, commands.clone()) {
            Ok(()) => {
                commands.flush();
                self.post(LifecycleEvent::LoadFinished);
            }
            Err(err) => {
                warn!(%err, url = %request.url, "page script failed to load");
                self.abandon_staging(Some(handle));
            }
        }
    }

    /// Drops a staged page that will never become visible and moves the queue on.
    fn abandon_staging(&self, handle: Option<PageHandle>) {
        let removed = handle.and_then(|handle| self.arena.lock().remove(handle));
        if let Some(page) = removed {
            let recycle_id = page.purpose != LoadPurpose::Restore;
            if recycle_id {
                self.stack.lock().forget(page.page_id);
            }
            self.post(LifecycleEvent::DestroyPage {
                page_id: page.page_id,
                recycle_id,
            });
        }
        self.single_page.lock().take();
        self.staging.store(false, Ordering::SeqCst);
        self.post(LifecycleEvent::ResetStagingPage);
        self.process_next();
    }

    fn on_commands_flushed(&self, handle: PageHandle, commands: Vec<RenderCommand>) {
        let mut arena = self.arena.lock();
        let Some(page) = arena.get_mut(handle) else {
            debug!("commands flushed for a destroyed page dropped");
            return;
        };
        page.fragments += 1;
        let page_id = page.page_id;
        if page.state == LifecycleState::ScriptLoading {
            page.advance(LifecycleState::CommandsReady);
            drop(arena);
            self.set_phase(LifecycleState::CommandsReady);
            self.post(LifecycleEvent::PageReady {
                page: handle,
                commands,
            });
        } else {
            drop(arena);
            trace!(%page_id, count = commands.len(), "incremental page update");
            self.post(LifecycleEvent::ApplyUpdate { page_id, commands });
        }
    }

    fn on_page_ready(&self, handle: PageHandle, commands: Vec<RenderCommand>) {
        let Some((page_id, url, purpose, is_main)) = self
            .arena
            .lock()
            .get(handle)
            .map(|page| (page.page_id, page.url.clone(), page.purpose, page.is_main))
        else {
            debug!("page ready for a destroyed page dropped");
            return;
        };
        let built = BuiltPage {
            page_id,
            url,
            commands,
        };
        match purpose {
            LoadPurpose::Push => self.push_page(handle, built, is_main),
            LoadPurpose::Replace => self.replace_page(handle, built),
            LoadPurpose::Restore => self.restore_pop_page(handle, built),
        }
    }

    fn begin_transition(&self, handle: PageHandle) {
        if let Some(page) = self.arena.lock().get_mut(handle) {
            if !page.advance(LifecycleState::Transitioning) {
                debug!(page_id = %page.page_id, state = ?page.state, "page cannot start a transition");
            }
        }
        self.set_phase(LifecycleState::Transitioning);
    }

    fn install_listener(&self, handle: PageHandle, kind: TransitionKind) {
        let me = self.me.clone();
        let listener = Box::new(move |event: TransitionEvent, _incoming: Option<PageId>, _outgoing: Option<PageId>| {
            if !kind.completes_on(event) {
                return;
            }
            if let Some(coordinator) = me.upgrade() {
                coordinator.post(LifecycleEvent::Transition {
                    page: handle,
                    kind: kind.clone(),
                    event,
                });
            }
        });
        self.drop_listener();
        let id = self.parts.render.add_transition_listener(listener);
        *self.listener.lock() = Some(id);
    }

    fn drop_listener(&self) {
        let previous = self.listener.lock().take();
        if let Some(id) = previous {
            self.parts.render.remove_transition_listener(id);
        }
    }

    fn push_page(&self, handle: PageHandle, built: BuiltPage, is_main: bool) {
        if !self.parts.render.can_push_page() {
            warn!(page_id = %built.page_id, "render tree refused the push");
            self.abandon_staging(Some(handle));
            return;
        }
        if !is_main {
            self.hide_top_page();
        }
        let page_id = built.page_id;
        self.parts.render.set_accessibility_root(page_id);
        self.begin_transition(handle);
        self.install_listener(handle, TransitionKind::Push);
        let retired = *self.single_page.lock();
        if let Some(retired) = retired {
            self.parts.render.set_single_page_id(retired);
        }
        self.parts.render.push_page(built);
        self.staging.store(false, Ordering::SeqCst);
    }

    fn replace_page(&self, handle: PageHandle, built: BuiltPage) {
        if !self.parts.render.can_replace_page() {
            warn!(page_id = %built.page_id, "render tree refused the replace");
            self.abandon_staging(Some(handle));
            return;
        }
        self.hide_top_page();
        self.parts.render.set_accessibility_root(built.page_id);
        self.begin_transition(handle);
        let retired = *self.single_page.lock();
        if let Some(retired) = retired {
            self.parts.render.set_single_page_id(retired);
        }
        let me = self.me.clone();
        self.parts.render.replace_page(
            built,
            Box::new(move || {
                if let Some(coordinator) = me.upgrade() {
                    coordinator.post(LifecycleEvent::ReplaceFinished(handle));
                }
            }),
        );
        self.staging.store(false, Ordering::SeqCst);
    }

    fn restore_pop_page(&self, handle: PageHandle, built: BuiltPage) {
        if self.stack.lock().len() <= 1 {
            warn!(url = %built.url, "no page left to restore under");
            self.abandon_staging(Some(handle));
            return;
        }
        self.hide_top_page();
        self.begin_transition(handle);
        self.install_listener(handle, TransitionKind::Restore);
        self.parts.render.restore_pop_page(built);
        self.staging.store(false, Ordering::SeqCst);
    }

    fn on_transition(&self, handle: PageHandle, kind: TransitionKind, event: TransitionEvent) {
        let claimed = {
            let mut arena = self.arena.lock();
            let in_transition = arena
                .get(handle)
                .is_some_and(|page| page.state == LifecycleState::Transitioning);
            if in_transition {
                if kind == TransitionKind::Pop {
                    arena.remove(handle);
                } else if let Some(page) = arena.get_mut(handle) {
                    page.advance(LifecycleState::Visible);
                }
            }
            in_transition
        };
        if !claimed {
            trace!(?kind, ?event, "stale transition event dropped");
            return;
        }
        self.drop_listener();
        match kind {
            TransitionKind::Push => self.on_push_end(handle),
            TransitionKind::Pop => self.on_pop_end(),
            TransitionKind::PopTo { page_id } => self.on_pop_to_end(page_id),
            TransitionKind::Restore => self.on_restore_end(handle),
        }
    }

    fn record_for(&self, handle: PageHandle) -> Option<PageRecord> {
        self.arena.lock().get(handle).map(|page| {
            let mut record = PageRecord::new(page.page_id, page.url.clone());
            record.recoverable = page.recoverable;
            record.is_named_route = page.is_named_route;
            record
        })
    }

    fn on_push_end(&self, handle: PageHandle) {
        let Some(record) = self.record_for(handle) else {
            return;
        };
        let page_id = record.page_id;
        let (filled, retired) = {
            let mut stack = self.stack.lock();
            stack.attach(page_id, handle);
            let filled = stack.push(record);
            let retired = self
                .single_page
                .lock()
                .take()
                .and_then(|id| stack.recycle_if_single_mode(id));
            (filled, retired)
        };
        if filled {
            warn!(capacity = self.config.max_stack_size, "page stack is full; further pushes are rejected");
        }
        info!(%page_id, "page pushed");
        self.release_records(retired.into_iter().collect());
        self.activate(page_id);
        self.process_next();
    }

    fn on_replace_finished(&self, handle: PageHandle) {
        let in_transition = self
            .arena
            .lock()
            .get(handle)
            .is_some_and(|page| page.state == LifecycleState::Transitioning);
        let Some(record) = self.record_for(handle).filter(|_| in_transition) else {
            trace!("stale replace completion dropped");
            return;
        };
        let page_id = record.page_id;
        let (replaced, retired) = {
            let mut stack = self.stack.lock();
            let replaced = stack.replace_top(record);
            stack.attach(page_id, handle);
            let retired = self
                .single_page
                .lock()
                .take()
                .and_then(|id| stack.recycle_if_single_mode(id));
            (replaced, retired)
        };
        info!(%page_id, "page replaced");
        self.release_records(replaced.into_iter().chain(retired).collect());
        self.activate(page_id);
        self.process_next();
    }

    fn on_pop_end(&self) {
        let (removed, top) = {
            let mut stack = self.stack.lock();
            let removed = stack.pop();
            (removed, stack.top().map(|record| record.page_id))
        };
        if let Some(record) = &removed {
            info!(page_id = %record.page_id, "page popped");
        }
        self.release_records(removed.into_iter().collect());
        if let Some(top) = top {
            self.activate(top);
        } else {
            self.post(LifecycleEvent::MediaQueryUpdate);
        }
        self.process_next();
    }

    fn on_pop_to_end(&self, page_id: PageId) {
        let removed = {
            let mut stack = self.stack.lock();
            match stack.position_of(page_id) {
                Some(position) => stack.pop_to_index(position),
                None => Vec::new(),
            }
        };
        info!(%page_id, popped = removed.len(), "popped to page");
        self.release_records(removed);
        self.activate(page_id);
        self.process_next();
    }

    fn on_restore_end(&self, handle: PageHandle) {
        let Some(page_id) = self.arena.lock().get(handle).map(|page| page.page_id) else {
            return;
        };
        let removed = {
            let mut stack = self.stack.lock();
            let removed = match stack.position_of(page_id) {
                Some(position) => stack.pop_to_index(position),
                None => Vec::new(),
            };
            stack.attach(page_id, handle);
            if let Some(top) = stack.top_mut() {
                top.is_restore = false;
            }
            removed
        };
        info!(%page_id, popped = removed.len(), "restored page realized");
        self.release_records(removed);
        self.activate(page_id);
        self.process_next();
    }

    /// Makes `page_id` the running page.
    fn activate(&self, page_id: PageId) {
        self.post(LifecycleEvent::SetCurrentPage(page_id));
        self.show_page(page_id);
        self.post(LifecycleEvent::MediaQueryUpdate);
    }

    /// Pages restored from a snapshot but never loaded have no instance and get no show.
    pub(crate) fn show_page(&self, page_id: PageId) {
        let Some(handle) = self.stack.lock().instance(page_id) else {
            trace!(%page_id, "show skipped for an unloaded page");
            return;
        };
        if let Some(page) = self.arena.lock().get_mut(handle) {
            page.advance(LifecycleState::Visible);
        }
        self.post(LifecycleEvent::PageShow(page_id));
    }

    pub(crate) fn hide_page(&self, page_id: PageId) {
        let Some(handle) = self.stack.lock().instance(page_id) else {
            trace!(%page_id, "hide skipped for an unloaded page");
            return;
        };
        if let Some(page) = self.arena.lock().get_mut(handle) {
            page.advance(LifecycleState::Hidden);
        }
        self.post(LifecycleEvent::PageHide(page_id));
    }

    fn hide_top_page(&self) {
        let top = self.stack.lock().top().map(|record| record.page_id);
        if let Some(top) = top {
            self.hide_page(top);
        }
    }

    /// Tells removed records' interceptors no decision will come and destroys their pages.
    fn release_records(&self, records: Vec<PageRecord>) {
        for mut record in records {
            record.release_interceptor();
            self.post(LifecycleEvent::DestroyPage {
                page_id: record.page_id,
                recycle_id: true,
            });
        }
    }

    fn destroy_page(&self, page_id: PageId, recycle_id: bool) {
        self.arena.lock().remove_page(page_id);
        self.parts.script.destroy_page(page_id);
        if recycle_id {
            self.ids.recycle(page_id);
        }
        debug!(%page_id, recycle_id, "page destroyed");
    }

    fn back_check_alert(&self, target: BackTarget, params: String) {
        let leave = {
            let stack = self.stack.lock();
            if stack.is_empty() {
                drop(stack);
                info!("back with an empty page stack ignored");
                self.process_next();
                return;
            }
            stack.top().and_then(|top| {
                top.leave_interceptor.clone().map(|interceptor| {
                    let dialog = top.pending_dialog.clone().unwrap_or_else(|| {
                        DialogSpec::leave_confirmation(
                            "",
                            self.config.dialog_cancel_text.clone(),
                            self.config.dialog_confirm_text.clone(),
                        )
                    });
                    (dialog, interceptor)
                })
            })
        };

        match leave {
            Some((dialog, interceptor)) => {
                *self.pending_back.lock() = Some((target, params));
                self.set_phase(LifecycleState::LeaveCheck);
                self.post(LifecycleEvent::ShowLeaveDialog {
                    dialog,
                    interceptor,
                });
            }
            None => self.start_back(target, params),
        }
    }

    fn show_leave_dialog(&self, dialog: DialogSpec, interceptor: LeaveInterceptor) {
        let me = self.me.clone();
        self.parts.dialogs.show_dialog(
            &dialog,
            Box::new(move |outcome| {
                if let Some(coordinator) = me.upgrade() {
                    coordinator.post(LifecycleEvent::LeaveDecided {
                        outcome,
                        interceptor,
                    });
                }
            }),
        );
    }

    fn on_leave_decided(&self, outcome: AlertOutcome, interceptor: LeaveInterceptor) {
        interceptor(outcome);
        let pending = self.pending_back.lock().take();
        match (outcome, pending) {
            (AlertOutcome::Confirm, Some((target, params))) => {
                // Answered; the page must not report Recovery when it is popped.
                if let Some(top) = self.stack.lock().top_mut() {
                    if top
                        .leave_interceptor
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &interceptor))
                    {
                        top.leave_interceptor = None;
                        top.pending_dialog = None;
                    }
                }
                self.start_back(target, params);
            }
            _ => {
                info!(?outcome, "leaving the page was not confirmed");
                self.process_next();
            }
        }
    }

    fn start_back(&self, target: BackTarget, params: String) {
        let position = match &target {
            BackTarget::Previous => {
                let len = self.stack.lock().len();
                (len > 1).then(|| len - 1)
            }
            BackTarget::Index(index) => Some(*index),
            BackTarget::Url(target) => {
                let Some(path) = self.resolve(target) else {
                    warn!(url = %target.url, "back to an unknown url");
                    self.process_next();
                    return;
                };
                let position = self.stack.lock().position_by_url(&path);
                if position.is_none() {
                    warn!(url = %path, "back to a page that is not on the stack");
                    self.process_next();
                    return;
                }
                position
            }
        };

        let Some(position) = position else {
            // Nothing under the current page; the last-page policy decides.
            self.post(LifecycleEvent::PopPage);
            return;
        };
        let found = {
            let mut stack = self.stack.lock();
            let len = stack.len();
            let found = stack
                .get(position)
                .filter(|_| position < len)
                .map(|record| (record.page_id, record.url.clone(), record.is_restore));
            if let Some((page_id, _, _)) = &found {
                if !params.is_empty() {
                    stack.set_params(*page_id, params.clone());
                }
                stack.set_active_params(*page_id);
            }
            found
        };
        let Some((page_id, url, is_restore)) = found else {
            info!(position, ?target, "back target is already the current page");
            self.process_next();
            return;
        };

        if is_restore {
            let params = self.stack.lock().params(page_id).unwrap_or_default().to_string();
            self.set_phase(LifecycleState::Resolving);
            if let Err(err) =
                self.load_page(Some(page_id), RouterTarget::new(url.clone()), params, LoadPurpose::Restore)
            {
                warn!(%err, %page_id, %url, "restoring the back target failed");
            }
        } else if matches!(target, BackTarget::Previous) {
            self.post(LifecycleEvent::PopPage);
        } else {
            self.post(LifecycleEvent::PopToPage(page_id));
        }
    }

    fn pop_page(&self) {
        let (len, top) = {
            let stack = self.stack.lock();
            (stack.len(), stack.top().map(|record| record.page_id))
        };
        let Some(top) = top else {
            self.process_next();
            return;
        };

        if len == 1 {
            if self.config.disallow_pop_last_page {
                warn!("popping the last page is disabled");
                self.process_next();
                return;
            }
            self.hide_page(top);
            let removed = self.stack.lock().pop();
            self.release_records(removed.into_iter().collect());
            info!("last page popped");
            self.parts.render.finish();
            self.process_next();
            return;
        }

        if !self.parts.render.can_pop_page() {
            warn!("render tree refused the pop");
            self.post(LifecycleEvent::ResetStagingPage);
            self.process_next();
            return;
        }
        let Some(handle) = self.stack.lock().instance(top) else {
            warn!(page_id = %top, "top page has no live instance");
            self.process_next();
            return;
        };
        self.hide_page(top);
        self.begin_transition(handle);
        self.install_listener(handle, TransitionKind::Pop);
        self.parts.render.pop_page();
    }

    fn pop_to_page(&self, page_id: PageId) {
        let handle = self.stack.lock().instance(page_id);
        let Some(handle) = handle else {
            warn!(%page_id, "pop target has no live instance");
            self.process_next();
            return;
        };
        if !self.parts.render.can_pop_page() {
            warn!(%page_id, "render tree refused the pop");
            self.post(LifecycleEvent::ResetStagingPage);
            self.process_next();
            return;
        }
        self.hide_top_page();
        self.begin_transition(handle);
        self.install_listener(handle, TransitionKind::PopTo { page_id });
        self.parts.render.pop_to_page(page_id);
    }

    fn clear_invisible_pages(&self) {
        if self.parts.render.clear_invisible_pages() {
            let removed = self.stack.lock().clear();
            info!(cleared = removed.len(), "invisible pages cleared");
            self.release_records(removed);
        } else {
            warn!("render tree refused to clear invisible pages");
        }
        self.process_next();
    }

    /// Serializes the page stack.
    pub fn content_info(&self, kind: RestoreKind) -> String {
        let entries: Vec<StackEntry> = {
            let stack = self.stack.lock();
            stack
                .records()
                .iter()
                .filter(|record| kind != RestoreKind::ResourceScheduleRecovery || record.recoverable)
                .map(|record| StackEntry {
                    url: record.url.clone(),
                    params: stack.params(record.page_id).unwrap_or_default().to_string(),
                    is_named_route: record.is_named_route,
                })
                .collect()
        };
        let snapshot = Snapshot {
            entries,
            node_info: kind
                .carries_node_info()
                .then(|| self.parts.render.stored_node_info())
                .filter(|info| !info.is_null()),
            named_router_info: self.parts.manifest.named_router_info(),
            full_path_info: self.parts.manifest.full_path_info(),
        };
        snapshot.encode(kind)
    }

    /// Rebuilds all but the top entry of a snapshot as unrealized records and returns the
    /// top entry. Nothing changes unless the whole snapshot is valid and the stack is
    /// still empty.
    pub fn restore(&self, content: &str, kind: RestoreKind) -> Result<RouterRecoverRecord> {
        let live = self.stack.lock().len();
        if live > 0 {
            warn!(live, "restore into a router that already has pages rejected");
            return Err(RouterError::WrongPageRouter(format!(
                "page stack already holds {live} pages"
            )));
        }
        let snapshot = Snapshot::decode(content, kind)?;
        let Some((top, older)) = snapshot.entries.split_last() else {
            return Err(RouterError::WrongPageRouter("stackInfo is empty".into()));
        };

        let mut ids = Vec::with_capacity(older.len());
        for _ in older {
            match self.ids.allocate() {
                Some(id) => ids.push(id),
                None => {
                    for id in ids {
                        self.ids.recycle(id);
                    }
                    return Err(RouterError::InvalidPageId);
                }
            }
        }

        if let Some(info) = snapshot.node_info {
            self.parts.render.restore_node_info(info);
        }
        if let Some(info) = snapshot.named_router_info {
            self.parts.manifest.restore_named_router_info(info);
        }
        if let Some(info) = snapshot.full_path_info {
            self.parts.manifest.restore_full_path_info(info);
        }

        {
            let mut stack = self.stack.lock();
            for (entry, page_id) in older.iter().zip(ids) {
                let url = self
                    .parts
                    .manifest
                    .page_path(&entry.url)
                    .unwrap_or_else(|| entry.url.clone());
                let mut record = PageRecord::restored(page_id, url);
                record.is_named_route = entry.is_named_route;
                stack.push(record);
                if !entry.params.is_empty() {
                    stack.set_params(page_id, entry.params.clone());
                }
            }
        }
        info!(restored = older.len(), top = %top.url, "router stack restored");
        Ok(RouterRecoverRecord::from(top))
    }
}
