use anyhow::{Result, bail};
use rune_config::RuneConfig;
use rune_router::{
    AlertOutcome, ContentErrorCode, ErrorCallback, ManualExecutor, Navigator, RestoreKind, RouterErrorCode,
    RouterMode, RouterTarget, StaticManifest, TaskExecutor,
};
use std::sync::Arc;

mod console;
use console::{ConsoleDialogs, ConsoleRender, ConsoleScript};

const DEMO_PAGES: &[&str] = &["pages/index", "pages/list", "pages/detail", "pages/settings"];

fn build(config: &RuneConfig, executor: Arc<ManualExecutor>) -> Result<Navigator> {
    let navigator = Navigator::builder()
        .executor(executor as Arc<dyn TaskExecutor>)
        .script_engine(Arc::new(ConsoleScript))
        .render_tree(Arc::new(ConsoleRender::default()))
        .manifest(Arc::new(StaticManifest::new(&config.manifest)))
        .dialogs(Arc::new(ConsoleDialogs))
        .config(config.router.clone())
        .build()?;
    Ok(navigator)
}

fn print_stack(navigator: &Navigator) {
    let urls: Vec<String> = navigator.pages().into_iter().map(|page| page.url).collect();
    println!("stack ({}): {}", navigator.stack_size(), urls.join(" > "));
}

fn main() -> Result<()> {
    let _ = env_logger::try_init();

    let mut config = RuneConfig::load();
    if config.manifest.pages.is_empty() {
        log::info!("no pages in rune.toml; using the demo manifest");
        config.manifest.pages = DEMO_PAGES.iter().map(|page| page.to_string()).collect();
        config
            .manifest
            .named_routes
            .insert("settings".into(), "pages/settings".into());
    }

    let executor = Arc::new(ManualExecutor::new());
    let navigator = build(&config, Arc::clone(&executor))?;

    let code = navigator.run_page("", "");
    if code != ContentErrorCode::NoErrors {
        bail!("cannot start the entry page: {code:?}");
    }
    executor.run_until_idle();
    print_stack(&navigator);

    let on_error: ErrorCallback = Arc::new(|message: &str, code: RouterErrorCode| {
        if code != RouterErrorCode::NoError {
            log::warn!("navigation failed: {message} ({})", code.code());
        }
    });
    navigator.push_with_callback(RouterTarget::new("pages/list"), "", Some(on_error.clone()));
    navigator.push_with_callback(RouterTarget::new("pages/detail"), r#"{"id":7}"#, Some(on_error.clone()));
    navigator.push_with_callback(RouterTarget::new("pages/missing"), "", Some(on_error.clone()));
    navigator.push_with_callback(
        RouterTarget::new("pages/list").with_mode(RouterMode::Single),
        "",
        Some(on_error),
    );
    executor.run_until_idle();
    print_stack(&navigator);

    navigator.enable_alert_before_back_page(
        "Leave the list?",
        Arc::new(|outcome: AlertOutcome| log::info!("leave answered: {outcome:?}")),
    );
    navigator.back("", "");
    executor.run_until_idle();
    print_stack(&navigator);

    navigator.push_named_route("settings", "", None);
    executor.run_until_idle();
    print_stack(&navigator);
    if let Some(state) = navigator.state() {
        println!("current: {}{} at {}", state.path, state.name, state.index);
    }

    let snapshot = navigator.get_content_info(RestoreKind::Continuation);
    println!("snapshot: {snapshot}");

    let restored_executor = Arc::new(ManualExecutor::new());
    let restored = build(&config, Arc::clone(&restored_executor))?;
    let top = restored.restore_router_stack(&snapshot, RestoreKind::Continuation)?;
    restored.run_page(&top.url, &top.params);
    restored_executor.run_until_idle();
    print!("restored ");
    print_stack(&restored);
    restored.back("", "");
    restored_executor.run_until_idle();
    print!("after back ");
    print_stack(&restored);
    Ok(())
}
