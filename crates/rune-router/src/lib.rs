//! Page router for the Rune declarative runtime.
//!
//! Navigation requests (push, replace, back, clear) are queued and run one at a time.
//! Each one loads page script on the script context, hands the built page to the render
//! tree on the UI context and updates the page stack once the render transition ends.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # fn wire(
//! #     executor: Arc<dyn rune_router::TaskExecutor>,
//! #     script: Arc<dyn rune_router::ScriptEngine>,
//! #     render: Arc<dyn rune_router::RenderTree>,
//! #     dialogs: Arc<dyn rune_router::DialogPresenter>,
//! # ) -> rune_router::Result<()> {
//! use rune_config::RuneConfig;
//! use rune_router::{Navigator, RouterTarget, StaticManifest};
//!
//! let config = RuneConfig::load();
//! let navigator = Navigator::builder()
//!     .executor(executor)
//!     .script_engine(script)
//!     .render_tree(render)
//!     .dialogs(dialogs)
//!     .manifest(Arc::new(StaticManifest::new(&config.manifest)))
//!     .config(config.router)
//!     .build()?;
//!
//! navigator.run_page("", "");
//! navigator.push(RouterTarget::new("pages/detail"), r#"{"id":7}"#);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod navigator;
pub mod page;
pub mod page_id;
pub mod page_stack;
pub mod snapshot;
pub mod task_queue;
pub mod timer;

pub use context::{ExecutionContext, ManualExecutor, Task, TaskExecutor, ThreadedExecutor};
pub use error::{ContentErrorCode, Result, RouterError, RouterErrorCode};
pub use host::{
    AlertOutcome, BuiltPage, DialogButton, DialogPresenter, DialogSpec, ListenerId,
    PageCommands, PageLoadRequest, RenderCommand, RenderTree, RouteManifest, ScriptEngine,
    ScriptError, TransitionEvent, TransitionListener,
};
pub use lifecycle::{Collaborators, PageLifecycleCoordinator};
pub use manifest::StaticManifest;
pub use navigator::{Navigator, NavigatorBuilder, RouterState, split_page_url};
pub use page::LifecycleState;
pub use page_id::{MAX_PAGE_ID_SIZE, PageId, PageIdAllocator};
pub use page_stack::{LeaveInterceptor, PageRecord, PageStack, PageSummary};
pub use snapshot::{RestoreKind, RouterRecoverRecord};
pub use task_queue::{ErrorCallback, RouterIntent, RouterMode, RouterTarget, RouterTaskQueue};
pub use timer::TimerCallback;
