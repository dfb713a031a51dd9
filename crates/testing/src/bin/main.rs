// Minikernel test runner
// Executes the end-to-end scenario suite and reports the outcome.

use anyhow::Result;
use chrono::Utc;
use minikernel_testing::{scenarios, setup_logging, TestReport};
use std::env;

fn main() -> Result<()> {
    setup_logging();

    let args: Vec<String> = env::args().collect();
    let json = args.iter().any(|a| a == "--json");

    log::info!("Minikernel scenario suite");

    let suite = scenarios::run_all();
    let report = TestReport {
        generated_at: Utc::now(),
        scenarios: suite,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.scenarios.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            log::info!("[{status}] {} - {}", result.name, result.description);
            if !result.passed {
                for line in &result.evidence {
                    log::error!("  {line}");
                }
            }
        }
        log::info!(
            "{}/{} scenarios passed",
            report.scenarios.passed,
            report.scenarios.total
        );
    }

    if report.scenarios.passed != report.scenarios.total {
        std::process::exit(1);
    }
    Ok(())
}
