/// Prints the loaded router configuration.
///
/// Run with: cargo run -p rune-config --example print_config

fn main() {
    let config = rune_config::RuneConfig::load();

    println!("=== Rune Router Configuration ===\n");

    println!("Router:");
    println!("  Max Stack Size: {}", config.router.max_stack_size);
    println!("  Max Queue Depth: {}", config.router.max_queue_depth);
    println!("  Disallow Pop Last Page: {}", config.router.disallow_pop_last_page);
    println!(
        "  Dialog Buttons: {:?} / {:?}",
        config.router.dialog_cancel_text, config.router.dialog_confirm_text
    );
    println!();

    println!("Manifest:");
    println!("  Entry: {:?}", config.manifest.entry_page());
    println!("  Pages: {}", config.manifest.pages.len());
    for (name, url) in &config.manifest.named_routes {
        println!("  Named Route: {name} -> {url}");
    }
    println!();

    match toml::to_string_pretty(&config) {
        Ok(toml_str) => {
            println!("=== Serialized Configuration ===");
            println!("{}", toml_str);
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
        }
    }
}
