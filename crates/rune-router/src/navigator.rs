//! Public navigation API.
//!
//! Every mutating call becomes a [`RouterIntent`] on the router queue, so navigation
//! requests issued back to back run strictly one after another. Queries read the page
//! stack directly and never wait on the queue.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use rune_config::RouterConfig;

use crate::context::TaskExecutor;
use crate::error::{ContentErrorCode, Result, RouterError};
use crate::host::{AlertOutcome, DialogPresenter, DialogSpec, RenderTree, RouteManifest, ScriptEngine};
use crate::lifecycle::{Collaborators, PageLifecycleCoordinator};
use crate::manifest::PAGE_SCRIPT_SUFFIX;
use crate::page::LifecycleState;
use crate::page_stack::{LeaveInterceptor, PageRecord, PageStack, PageSummary};
use crate::snapshot::{RestoreKind, RouterRecoverRecord};
use crate::task_queue::{ErrorCallback, RouterIntent, RouterTarget};
use crate::timer::{TimerCallback, TimerRegistry};

/// Snapshot of one stack entry as seen by page script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterState {
    /// 1-based position, bottom page first.
    pub index: usize,
    /// File name of the page, e.g. `detail`.
    pub name: String,
    /// Directory of the page with a trailing `/`, e.g. `pages/`.
    pub path: String,
    pub params: String,
}

/// Splits a page script path into its directory and file name, dropping the suffix.
pub fn split_page_url(url: &str) -> (String, String) {
    let url = url.strip_suffix(PAGE_SCRIPT_SUFFIX).unwrap_or(url);
    match url.rfind('/') {
        Some(pos) => (url[pos + 1..].to_string(), url[..=pos].to_string()),
        None => (url.to_string(), String::new()),
    }
}

fn state_of(stack: &PageStack, index: usize, record: &PageRecord) -> RouterState {
    let (name, path) = split_page_url(&record.url);
    RouterState {
        index,
        name,
        path,
        params: stack.params(record.page_id).unwrap_or_default().to_string(),
    }
}

#[derive(Default)]
pub struct NavigatorBuilder {
    executor: Option<Arc<dyn TaskExecutor>>,
    script: Option<Arc<dyn ScriptEngine>>,
    render: Option<Arc<dyn RenderTree>>,
    manifest: Option<Arc<dyn RouteManifest>>,
    dialogs: Option<Arc<dyn DialogPresenter>>,
    timer_callback: Option<TimerCallback>,
    config: RouterConfig,
}

impl NavigatorBuilder {
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn script_engine(mut self, script: Arc<dyn ScriptEngine>) -> Self {
        self.script = Some(script);
        self
    }

    pub fn render_tree(mut self, render: Arc<dyn RenderTree>) -> Self {
        self.render = Some(render);
        self
    }

    pub fn manifest(mut self, manifest: Arc<dyn RouteManifest>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn dialogs(mut self, dialogs: Arc<dyn DialogPresenter>) -> Self {
        self.dialogs = Some(dialogs);
        self
    }

    pub fn timer_callback(mut self, callback: TimerCallback) -> Self {
        self.timer_callback = Some(callback);
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails with [`RouterError::NullPageRouter`] when a collaborator is missing.
    pub fn build(self) -> Result<Navigator> {
        let (Some(executor), Some(script), Some(render), Some(manifest), Some(dialogs)) = (
            self.executor,
            self.script,
            self.render,
            self.manifest,
            self.dialogs,
        ) else {
            return Err(RouterError::NullPageRouter);
        };

        let timer_callback = self.timer_callback.unwrap_or_else(|| {
            Arc::new(|callback_id: &str, _delay: Duration, _interval: bool| {
                debug!(callback_id, "timer fired without a handler");
            })
        });
        let timers = TimerRegistry::new(Arc::clone(&executor), timer_callback);
        let core = PageLifecycleCoordinator::new(
            Collaborators {
                executor,
                script,
                render,
                manifest,
                dialogs,
            },
            self.config,
        );
        Ok(Navigator { core, timers })
    }
}

pub struct Navigator {
    core: Arc<PageLifecycleCoordinator>,
    timers: TimerRegistry,
}

impl Navigator {
    pub fn builder() -> NavigatorBuilder {
        NavigatorBuilder::default()
    }

    pub fn coordinator(&self) -> &Arc<PageLifecycleCoordinator> {
        &self.core
    }

    pub fn phase(&self) -> LifecycleState {
        self.core.phase()
    }

    /// Starts the app on `url`, or on the manifest entry when `url` is empty.
    pub fn run_page(&self, url: &str, params: &str) -> ContentErrorCode {
        let manifest = &self.core.collaborators().manifest;
        let url = if url.is_empty() {
            match manifest.entry() {
                Some(entry) => entry,
                None => {
                    warn!("manifest has no entry page");
                    return ContentErrorCode::ParseManifestFailed;
                }
            }
        } else {
            url.to_string()
        };
        if manifest.page_path(&url).is_none() {
            warn!(%url, "run_page with an unknown url");
            return ContentErrorCode::ParseManifestFailed;
        }
        info!(%url, "running page");
        self.core.submit(RouterIntent::Push {
            target: RouterTarget::new(url),
            params: params.to_string(),
            on_error: None,
        });
        ContentErrorCode::NoErrors
    }

    pub fn push(&self, target: RouterTarget, params: impl Into<String>) {
        self.push_with_callback(target, params, None);
    }

    /// `on_error` receives exactly one outcome, `NoError` included.
    pub fn push_with_callback(
        &self,
        target: RouterTarget,
        params: impl Into<String>,
        on_error: Option<ErrorCallback>,
    ) {
        self.core.submit(RouterIntent::Push {
            target,
            params: params.into(),
            on_error,
        });
    }

    pub fn push_named_route(&self, name: &str, params: impl Into<String>, on_error: Option<ErrorCallback>) {
        self.push_with_callback(RouterTarget::named(name), params, on_error);
    }

    pub fn replace(&self, target: RouterTarget, params: impl Into<String>) {
        self.replace_with_callback(target, params, None);
    }

    pub fn replace_with_callback(
        &self,
        target: RouterTarget,
        params: impl Into<String>,
        on_error: Option<ErrorCallback>,
    ) {
        self.core.submit(RouterIntent::Replace {
            target,
            params: params.into(),
            on_error,
        });
    }

    pub fn replace_named_route(&self, name: &str, params: impl Into<String>, on_error: Option<ErrorCallback>) {
        self.replace_with_callback(RouterTarget::named(name), params, on_error);
    }

    /// Goes back to the most recent page of `url`, or one page when `url` is empty.
    pub fn back(&self, url: &str, params: impl Into<String>) {
        self.core.submit(RouterIntent::Back {
            target: RouterTarget::new(url),
            params: params.into(),
        });
    }

    /// Goes back to the page at a 1-based index.
    pub fn back_to_index(&self, index: usize, params: impl Into<String>) {
        self.core.submit(RouterIntent::BackToIndex {
            index,
            params: params.into(),
        });
    }

    /// Drops every page below the current one.
    pub fn clear(&self) {
        self.core.submit(RouterIntent::Clear);
    }

    /// Bottom-first view of the page stack.
    pub fn pages(&self) -> Vec<PageSummary> {
        self.core.stack().summaries()
    }

    pub fn stack_size(&self) -> usize {
        self.core.stack().len()
    }

    /// 1-based index of the current page, `0` when there is none.
    pub fn current_page_index(&self) -> usize {
        self.stack_size()
    }

    pub fn state(&self) -> Option<RouterState> {
        let stack = self.core.stack();
        let index = stack.len();
        stack.top().map(|record| state_of(&stack, index, record))
    }

    pub fn state_by_index(&self, index: usize) -> Option<RouterState> {
        let stack = self.core.stack();
        stack.get(index).map(|record| state_of(&stack, index, record))
    }

    /// Every page of `url`, bottom first.
    pub fn state_by_url(&self, url: &str) -> Vec<RouterState> {
        let path = self.resolve_path(url);
        let stack = self.core.stack();
        stack
            .records()
            .iter()
            .enumerate()
            .filter(|(_, record)| record.url == path)
            .map(|(idx, record)| state_of(&stack, idx + 1, record))
            .collect()
    }

    /// Params of the page most recently navigated to.
    pub fn params(&self) -> String {
        self.core
            .stack()
            .active_params()
            .unwrap_or_default()
            .to_string()
    }

    /// 0-based position of the oldest page of `url`.
    pub fn index_by_url(&self, url: &str) -> Option<usize> {
        let path = self.resolve_path(url);
        self.core.stack().index_of_url(&path)
    }

    /// True when the page at a 1-based index came from a snapshot and was not shown yet.
    pub fn is_unrestored_by_index(&self, index: usize) -> bool {
        self.core
            .stack()
            .get(index)
            .is_some_and(|record| record.is_restore)
    }

    fn resolve_path(&self, url: &str) -> String {
        self.core
            .collaborators()
            .manifest
            .page_path(url)
            .unwrap_or_else(|| url.to_string())
    }

    /// Asks for confirmation before the current page is left by a back navigation.
    pub fn enable_alert_before_back_page(&self, message: &str, interceptor: LeaveInterceptor) {
        let previous = {
            let mut stack = self.core.stack();
            let config = self.core.config();
            let Some(top) = stack.top_mut() else {
                warn!("no page to guard with a leave confirmation");
                return;
            };
            top.pending_dialog = Some(DialogSpec::leave_confirmation(
                message,
                config.dialog_cancel_text.clone(),
                config.dialog_confirm_text.clone(),
            ));
            top.leave_interceptor.replace(interceptor)
        };
        if let Some(previous) = previous {
            previous(AlertOutcome::Recovery);
        }
    }

    pub fn disable_alert_before_back_page(&self) {
        let previous = {
            let mut stack = self.core.stack();
            stack.top_mut().and_then(|top| {
                top.pending_dialog = None;
                top.leave_interceptor.take()
            })
        };
        if let Some(previous) = previous {
            previous(AlertOutcome::Recovery);
        }
    }

    pub fn get_content_info(&self, kind: RestoreKind) -> String {
        self.core.content_info(kind)
    }

    /// Rebuilds the stack below the top page from a snapshot. The returned record is the
    /// top page; start it with [`Navigator::run_page`] or [`Navigator::push_named_route`].
    /// Only valid before any page is running; otherwise fails with
    /// [`RouterError::WrongPageRouter`].
    pub fn restore_router_stack(&self, content: &str, kind: RestoreKind) -> Result<RouterRecoverRecord> {
        self.core.restore(content, kind)
    }

    /// System back. Returns `false` when there is nothing left to go back to.
    pub fn on_back_press(&self) -> bool {
        let (top, size) = {
            let stack = self.core.stack();
            (stack.top().map(|record| record.page_id), stack.len())
        };
        let Some(top) = top else {
            return false;
        };
        if self.core.collaborators().script.back_press(top) {
            return true;
        }
        if size <= 1 {
            return false;
        }
        self.back("", "");
        true
    }

    pub fn on_foreground(&self) {
        let top = self.core.stack().top().map(|record| record.page_id);
        if let Some(top) = top {
            self.core.show_page(top);
        }
    }

    pub fn on_background(&self) {
        let top = self.core.stack().top().map(|record| record.page_id);
        if let Some(top) = top {
            self.core.hide_page(top);
        }
    }

    pub fn wait_timer(&self, callback_id: &str, delay: Duration, is_interval: bool, is_first: bool) {
        self.timers.wait_timer(callback_id, delay, is_interval, is_first);
    }

    pub fn clear_timer(&self, callback_id: &str) {
        self.timers.clear_timer(callback_id);
    }
}
