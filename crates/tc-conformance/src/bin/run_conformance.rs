#![forbid(unsafe_code)]

use std::path::PathBuf;

use serde_json::json;
use tc_api::SessionConfig;
use tc_conformance::{
    CaseStatus, HarnessConfig, init_tracing, load_command_fixture,
    run_command_conformance_with_fixture,
};

fn main() -> Result<(), String> {
    init_tracing()?;

    let mut fixture: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut accelerator = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fixture" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--fixture requires a file path".to_string())?;
                fixture = Some(PathBuf::from(value));
            }
            "--output" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--output requires a file path".to_string())?;
                output = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--config requires a file path".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--accelerator" => {
                accelerator = true;
            }
            other => {
                return Err(format!(
                    "unknown arg '{other}'. usage: run_conformance [--fixture path] [--config path] [--accelerator] [--output path]"
                ));
            }
        }
    }

    let mut harness = HarnessConfig::default_paths();
    if let Some(path) = config_path {
        let raw = std::fs::read_to_string(&path)
            .map_err(|error| format!("failed reading config {}: {error}", path.display()))?;
        harness.session = SessionConfig::from_json_str(&raw).map_err(|error| error.to_string())?;
    }
    if accelerator {
        harness.session.accelerator_available = true;
    }

    let fixture_path = fixture.unwrap_or_else(|| harness.command_fixture_path());
    let fixture = load_command_fixture(&fixture_path)?;
    let (report, cases) = run_command_conformance_with_fixture(&harness, &fixture)?;

    let failures: Vec<_> = cases
        .iter()
        .filter(|case| case.status == CaseStatus::Failed)
        .map(|case| {
            json!({
                "name": case.name,
                "command": case.command,
                "mismatches": case.mismatches,
            })
        })
        .collect();

    let summary = serde_json::to_string_pretty(&json!({
        "suite": report.suite,
        "fixture": fixture_path.display().to_string(),
        "accelerator_available": report.accelerator_available,
        "cases_total": report.cases_total,
        "cases_passed": report.cases_passed,
        "cases_skipped": report.cases_skipped,
        "failures": failures,
    }))
    .map_err(|error| format!("failed to serialize summary: {error}"))?;

    match output {
        Some(path) => std::fs::write(&path, format!("{summary}\n"))
            .map_err(|error| format!("failed writing {}: {error}", path.display()))?,
        None => println!("{summary}"),
    }

    if report.all_passed() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} cases failed",
            report.cases_total - report.cases_passed - report.cases_skipped,
            report.cases_total
        ))
    }
}
