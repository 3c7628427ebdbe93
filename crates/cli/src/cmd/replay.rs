//! Replay a scenario file

use anyhow::{Context, Result};
use cli_lib::replay::{replay_realtime, replay_virtual};
use cli_lib::{Report, Scenario};
use owo_colors::OwoColorize;
use std::path::Path;
use tokio::task::LocalSet;

pub async fn run(path: &Path, realtime: bool, json: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;

    let report = if realtime {
        LocalSet::new().run_until(replay_realtime(&scenario)).await?
    } else {
        replay_virtual(&scenario)?
    };

    if json {
        let text = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{}", text);
    } else {
        print_report(path, &report);
    }
    Ok(())
}

fn print_report(path: &Path, report: &Report) {
    println!("{}", "Replay Report".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!("Scenario:      {}", path.display().to_string().cyan());
    print!("Capability:    ");
    match &report.capability {
        Some(name) => println!("{}", name.green()),
        None => {
            println!("{}", "Unsupported".red());
            println!("  {}", "Tip: list a constructor under 'capabilities'".dimmed());
        }
    }
    if let Some(ms) = report.debounce_ms {
        println!("Debounce:      {}ms", ms);
    }
    println!("Observed:      {} element(s)", report.observed);
    println!("Final state:   {}", report.final_state.yellow());
    println!();

    if report.firings_ms.is_empty() {
        println!("Callback:      {}", "never fired".dimmed());
    } else {
        println!("Callback fired {} time(s):", report.firings_ms.len());
        for (i, at) in report.firings_ms.iter().enumerate() {
            println!("  {:>3}. at {}ms", i + 1, at.to_string().cyan());
        }
    }
    println!();
    println!(
        "{}",
        format!("Elapsed: {}ms ({:?} clock)", report.elapsed_ms, report.clock).dimmed()
    );
}
