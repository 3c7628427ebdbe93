//! Check a scenario file and show what it resolves to

use anyhow::Result;
use cli_lib::Scenario;
use domwatch_core::DEBOUNCE_RANGE_MS;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(path: &Path) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let watcher = &scenario.watcher;

    println!("{} {}", "✓".green(), "Scenario is valid".bold());
    println!("{}: {}\n", "Location".dimmed(), path.display().dimmed());

    println!("{}", "[watcher]".yellow());
    println!("  {} = {:?}", "targets".cyan(), watcher.targets);
    println!(
        "  {} = {} {}",
        "debounce_ms".cyan(),
        watcher.debounce_ms,
        format!(
            "(valid: {}-{})",
            DEBOUNCE_RANGE_MS.start(),
            DEBOUNCE_RANGE_MS.end()
        )
        .dimmed()
    );
    println!("  {} = {}", "observe.child_list".cyan(), watcher.observe.child_list);
    println!("  {} = {}", "observe.subtree".cyan(), watcher.observe.subtree);
    println!("  {} = {}", "observe.attributes".cyan(), watcher.observe.attributes);

    println!("\n{}", "[document]".yellow());
    println!("  {} = {:?}", "capabilities".cyan(), scenario.capabilities);
    println!("  {} = {}", "loading".cyan(), scenario.loading);
    println!("  {} = {}", "elements".cyan(), scenario.elements.len());

    println!("\n{}", "[steps]".yellow());
    println!("  {} = {}", "count".cyan(), scenario.steps.len());
    println!("  {} = {}ms", "scripted_wait".cyan(), scenario.scripted_ms());

    Ok(())
}
