#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tc_api::{CommandError, CommandSession, SessionConfig};
use tc_engine::HostEngine;
use tracing::{debug, info};

const MAX_FIXTURE_BYTES: u64 = 1 << 20;
const DEFAULT_TOLERANCE: f64 = 1e-9;
pub const REFERENCE_MARKER: char = '$';

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub session: SessionConfig,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            session: SessionConfig::default(),
        }
    }

    #[must_use]
    pub fn command_fixture_path(&self) -> PathBuf {
        self.fixture_root.join("command_cases.json")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub accelerator_available: bool,
    pub cases_total: usize,
    pub cases_passed: usize,
    pub cases_skipped: usize,
}

impl HarnessReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.cases_passed + self.cases_skipped == self.cases_total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    Failed,
    /// The case pins an accelerator availability the session does not have.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCaseReport {
    pub name: String,
    pub command: String,
    pub status: CaseStatus,
    pub handle: Option<String>,
    pub mismatches: Vec<String>,
}

impl CommandCaseReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandFixtureFile {
    pub cases: Vec<CommandCase>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandCase {
    pub name: String,
    pub command: String,
    pub tokens: Vec<String>,
    #[serde(default)]
    pub accelerator: Option<bool>,
    #[serde(default)]
    pub expect: Option<CaseExpectation>,
    #[serde(default)]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseExpectation {
    pub syntax: Option<String>,
    pub dtype: Option<String>,
    pub device: Option<String>,
    pub device_fallback: Option<bool>,
    pub shape: Option<Vec<usize>>,
    pub requires_grad: Option<bool>,
    /// Compared against the tensor's leading values.
    pub values: Option<Vec<f64>>,
    pub tolerance: Option<f64>,
}

pub fn load_command_fixture(path: &Path) -> Result<CommandFixtureFile, String> {
    let metadata = fs::metadata(path).map_err(|error| {
        format!(
            "failed reading fixture metadata {}: {error}",
            path.display()
        )
    })?;
    let size = metadata.len();
    if size > MAX_FIXTURE_BYTES {
        return Err(format!(
            "fixture {} exceeds max bytes: actual={size} max={MAX_FIXTURE_BYTES}",
            path.display()
        ));
    }

    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed reading fixture {}: {error}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|error| format!("failed parsing fixture {}: {error}", path.display()))
}

pub fn run_command_conformance(
    config: &HarnessConfig,
) -> Result<(HarnessReport, Vec<CommandCaseReport>), String> {
    let fixture = load_command_fixture(&config.command_fixture_path())?;
    run_command_conformance_with_fixture(config, &fixture)
}

/// Runs every case in order against one session, so later cases can refer
/// to tensors made by earlier ones as `$case_name`.
pub fn run_command_conformance_with_fixture(
    config: &HarnessConfig,
    fixture: &CommandFixtureFile,
) -> Result<(HarnessReport, Vec<CommandCaseReport>), String> {
    let mut session = CommandSession::host(config.session.clone());
    let mut handles = BTreeMap::new();
    let mut case_reports = Vec::with_capacity(fixture.cases.len());
    for case in &fixture.cases {
        let report = run_command_case(&mut session, &handles, case)?;
        if let Some(handle) = &report.handle {
            handles.insert(case.name.clone(), handle.clone());
        }
        case_reports.push(report);
    }

    let cases_passed = case_reports.iter().filter(|case| case.passed()).count();
    let cases_skipped = case_reports
        .iter()
        .filter(|case| case.status == CaseStatus::Skipped)
        .count();
    let report = HarnessReport {
        suite: "tensor_creation_commands",
        accelerator_available: config.session.accelerator_available,
        cases_total: case_reports.len(),
        cases_passed,
        cases_skipped,
    };
    info!(
        total = report.cases_total,
        passed = report.cases_passed,
        skipped = report.cases_skipped,
        "command conformance finished"
    );
    Ok((report, case_reports))
}

fn run_command_case(
    session: &mut CommandSession<HostEngine>,
    handles: &BTreeMap<String, String>,
    case: &CommandCase,
) -> Result<CommandCaseReport, String> {
    let mut report = CommandCaseReport {
        name: case.name.clone(),
        command: case.command.clone(),
        status: CaseStatus::Passed,
        handle: None,
        mismatches: Vec::new(),
    };

    match (&case.expect, &case.expect_error) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(format!(
                "case {} must set exactly one of expect / expect_error",
                case.name
            ));
        }
        _ => {}
    }

    if let Some(wanted) = case.accelerator {
        if wanted != session.config().accelerator_available {
            report.status = CaseStatus::Skipped;
            return Ok(report);
        }
    }

    let tokens = substitute_references(&case.tokens, handles)?;
    debug!(case = case.name.as_str(), command = case.command.as_str(), "running case");

    let syntax = session
        .resolve(&case.command, &tokens)
        .ok()
        .map(|resolution| resolution.syntax.label());
    let result = session.invoke(&case.command, &tokens);

    match (result, &case.expect_error) {
        (Ok(outcome), None) => {
            let Some(tensor) = session.tensor(&outcome.handle) else {
                return Err(format!("case {}: handle {} vanished", case.name, outcome.handle));
            };
            if let Some(expect) = &case.expect {
                check_expectation(
                    &mut report.mismatches,
                    expect,
                    syntax,
                    outcome.device_fallback,
                    tensor,
                );
            }
            report.handle = Some(outcome.handle);
        }
        (Ok(outcome), Some(code)) => {
            report.handle = Some(outcome.handle);
            report
                .mismatches
                .push(format!("expected error {code}, command succeeded"));
        }
        (Err(error), Some(code)) => {
            if error.reason_code() != code {
                report.mismatches.push(format!(
                    "expected error {code}, got {}: {error}",
                    error.reason_code()
                ));
            }
        }
        (Err(error), None) => {
            report.mismatches.push(describe_failure(&error));
        }
    }

    if !report.mismatches.is_empty() {
        report.status = CaseStatus::Failed;
    }
    Ok(report)
}

fn describe_failure(error: &CommandError) -> String {
    format!("unexpected {} error: {error}", error.reason_code())
}

fn check_expectation(
    mismatches: &mut Vec<String>,
    expect: &CaseExpectation,
    syntax: Option<&'static str>,
    device_fallback: bool,
    tensor: &tc_engine::HostTensor,
) {
    let meta = tensor.meta();
    if let Some(wanted) = &expect.syntax {
        if syntax != Some(wanted.as_str()) {
            mismatches.push(format!("syntax: expected {wanted}, got {syntax:?}"));
        }
    }
    if let Some(wanted) = &expect.dtype {
        if meta.dtype().canonical_name() != wanted {
            mismatches.push(format!("dtype: expected {wanted}, got {}", meta.dtype()));
        }
    }
    if let Some(wanted) = &expect.device {
        if meta.device().name() != wanted {
            mismatches.push(format!("device: expected {wanted}, got {}", meta.device()));
        }
    }
    if let Some(wanted) = expect.device_fallback {
        if wanted != device_fallback {
            mismatches.push(format!(
                "device_fallback: expected {wanted}, got {device_fallback}"
            ));
        }
    }
    if let Some(wanted) = &expect.shape {
        if meta.shape() != wanted.as_slice() {
            mismatches.push(format!("shape: expected {wanted:?}, got {:?}", meta.shape()));
        }
    }
    if let Some(wanted) = expect.requires_grad {
        if tensor.requires_grad() != wanted {
            mismatches.push(format!(
                "requires_grad: expected {wanted}, got {}",
                tensor.requires_grad()
            ));
        }
    }
    if let Some(wanted) = &expect.values {
        let tolerance = expect.tolerance.unwrap_or(DEFAULT_TOLERANCE);
        let actual = tensor.values();
        let close = actual.len() >= wanted.len()
            && wanted
                .iter()
                .zip(actual)
                .all(|(expected, got)| (expected - got).abs() <= tolerance);
        if !close {
            let shown = &actual[..wanted.len().min(actual.len())];
            mismatches.push(format!("values: expected {wanted:?}, got {shown:?}"));
        }
    }
}

/// Replaces `$name` tokens with the handle bound to `name`.
pub fn substitute_references(
    tokens: &[String],
    handles: &BTreeMap<String, String>,
) -> Result<Vec<String>, String> {
    tokens
        .iter()
        .map(|token| match token.strip_prefix(REFERENCE_MARKER) {
            Some(name) => handles
                .get(name)
                .cloned()
                .ok_or_else(|| format!("unbound reference {token}")),
            None => Ok(token.clone()),
        })
        .collect()
}

/// Splits a script line into tokens. Whitespace separates tokens except
/// inside `[...]`, `{...}` or `"..."`.
pub fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' if depth == 0 => in_quotes = !in_quotes,
            '[' | '{' if !in_quotes => {
                depth += 1;
                current.push(ch);
            }
            ']' | '}' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced '{ch}' in: {line}"))?;
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err(format!("unterminated quote in: {line}"));
    }
    if depth != 0 {
        return Err(format!("unbalanced brackets in: {line}"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLineReport {
    pub line_no: usize,
    pub command: String,
    /// The handle made by the line, or the failure message.
    pub result: Result<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptReport {
    pub lines: Vec<ScriptLineReport>,
}

impl ScriptReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.lines.iter().filter(|line| line.result.is_err()).count()
    }
}

/// Runs a command script.
///
/// One command per line: `command token...`, optionally bound with
/// `name = command token...` so later lines can use `$name`. Blank lines and
/// lines starting with `#` are ignored. A failing line does not stop the
/// script.
pub fn run_script(session: &mut CommandSession<HostEngine>, source: &str) -> ScriptReport {
    let mut bindings = BTreeMap::new();
    let mut report = ScriptReport::default();

    for (idx, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = idx + 1;
        let (command, result) = match run_script_line(session, &bindings, line) {
            Ok((binding, command, handle)) => {
                if let Some(name) = binding {
                    bindings.insert(name, handle.clone());
                }
                (command, Ok(handle))
            }
            Err((command, message)) => (command, Err(message)),
        };
        report.lines.push(ScriptLineReport {
            line_no,
            command,
            result,
        });
    }
    report
}

type LineOutcome = Result<(Option<String>, String, String), (String, String)>;

fn run_script_line(
    session: &mut CommandSession<HostEngine>,
    bindings: &BTreeMap<String, String>,
    line: &str,
) -> LineOutcome {
    let mut tokens = split_command_line(line).map_err(|message| (String::new(), message))?;
    let binding = if tokens.len() >= 2 && tokens[1] == "=" {
        let name = tokens.remove(0);
        tokens.remove(0);
        Some(name)
    } else {
        None
    };
    if tokens.is_empty() {
        return Err((String::new(), format!("missing command in: {line}")));
    }
    let command = tokens.remove(0);
    let args = substitute_references(&tokens, bindings).map_err(|message| (command.clone(), message))?;
    match session.invoke(&command, &args) {
        Ok(outcome) => Ok((binding, command, outcome.handle)),
        Err(error) => Err((command, error.to_string())),
    }
}

/// Installs the fmt subscriber used by the binaries. `RUST_LOG` overrides
/// the default `warn` level. Fails when a global subscriber is already set.
pub fn init_tracing() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to install tracing subscriber: {error}"))
}
