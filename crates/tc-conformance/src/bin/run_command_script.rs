#![forbid(unsafe_code)]

use std::io::Read;
use std::path::PathBuf;

use tc_api::{CommandSession, SessionConfig};
use tc_conformance::{init_tracing, run_script};

fn main() -> Result<(), String> {
    init_tracing()?;

    let mut script: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut accelerator = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--accelerator" => {
                accelerator = true;
            }
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--config requires a file path".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => {
                return Err(format!(
                    "unknown arg '{other}'. usage: run_command_script [--config path] [--accelerator] [script]"
                ));
            }
            other => {
                if script.is_some() {
                    return Err("only one script path may be given".to_string());
                }
                script = Some(PathBuf::from(other));
            }
        }
    }

    let mut config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|error| format!("failed reading config {}: {error}", path.display()))?;
            SessionConfig::from_json_str(&raw).map_err(|error| error.to_string())?
        }
        None => SessionConfig::default(),
    };
    if accelerator {
        config.accelerator_available = true;
    }

    let source = match script {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|error| format!("failed reading script {}: {error}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|error| format!("failed reading stdin: {error}"))?;
            buffer
        }
    };

    let mut session = CommandSession::host(config);
    let report = run_script(&mut session, &source);
    for line in &report.lines {
        match &line.result {
            Ok(handle) => println!("{handle}"),
            Err(message) => println!("error: {message}"),
        }
    }

    match report.failures() {
        0 => Ok(()),
        failed => Err(format!("{failed} line(s) failed")),
    }
}
