use std::collections::BTreeSet;

use tc_api::{Command, CommandSession, SessionConfig};
use tc_conformance::{
    CaseStatus, CommandFixtureFile, HarnessConfig, load_command_fixture, run_command_conformance,
    run_command_conformance_with_fixture, run_script,
};
use tc_params::{ParamKey, SyntaxForm, resolve};

#[test]
fn command_fixture_passes_without_accelerator() {
    let cfg = HarnessConfig::default_paths();
    let (report, cases) = run_command_conformance(&cfg).expect("command conformance should run");

    let failed: Vec<_> = cases
        .iter()
        .filter(|case| case.status == CaseStatus::Failed)
        .collect();
    assert!(failed.is_empty(), "failed cases: {failed:#?}");
    assert_eq!(report.cases_total, cases.len());
    assert!(report.all_passed());
    assert_eq!(report.cases_skipped, 1);
}

#[test]
fn command_fixture_passes_with_accelerator() {
    let mut cfg = HarnessConfig::default_paths();
    cfg.session.accelerator_available = true;
    let (report, cases) = run_command_conformance(&cfg).expect("command conformance should run");

    let failed: Vec<_> = cases
        .iter()
        .filter(|case| case.status == CaseStatus::Failed)
        .collect();
    assert!(failed.is_empty(), "failed cases: {failed:#?}");
    assert!(report.accelerator_available);
    assert_eq!(report.cases_skipped, 1);
}

#[test]
fn fixture_touches_every_command_and_error_code() {
    let cfg = HarnessConfig::default_paths();
    let fixture = load_command_fixture(&cfg.command_fixture_path()).expect("fixture should load");

    let commands: BTreeSet<Command> = fixture
        .cases
        .iter()
        .filter_map(|case| Command::from_name(&case.command))
        .collect();
    assert_eq!(commands.len(), Command::all().len());

    let codes: BTreeSet<&str> = fixture
        .cases
        .iter()
        .filter_map(|case| case.expect_error.as_deref())
        .collect();
    for code in [
        "unknown_parameter",
        "missing_required",
        "missing_value",
        "type_mismatch",
        "unknown_enum_value",
        "arity",
        "unknown_handle",
        "engine",
        "unknown_command",
    ] {
        assert!(codes.contains(code), "no case expects {code}");
    }
}

#[test]
fn mismatched_expectations_are_reported() {
    let cfg = HarnessConfig::default_paths();
    let fixture: CommandFixtureFile = serde_json::from_str(
        r#"{
            "cases": [
                { "name": "a", "command": "ones", "tokens": ["[2]"], "expect": { "dtype": "int64", "values": [2, 2] } },
                { "name": "b", "command": "ones", "tokens": ["[2]"], "expect_error": "arity" },
                { "name": "c", "command": "ones_like", "tokens": ["$a"], "expect": { "shape": [2] } }
            ]
        }"#,
    )
    .expect("inline fixture should parse");
    let (report, cases) =
        run_command_conformance_with_fixture(&cfg, &fixture).expect("conformance should run");

    assert_eq!(report.cases_total, 3);
    assert_eq!(report.cases_passed, 1);
    assert_eq!(cases[0].mismatches.len(), 2);
    assert!(cases[1].mismatches[0].contains("command succeeded"));
    assert!(cases[2].passed());
}

#[test]
fn fixture_cases_must_choose_one_expectation() {
    let cfg = HarnessConfig::default_paths();
    let fixture: CommandFixtureFile = serde_json::from_str(
        r#"{ "cases": [ { "name": "a", "command": "ones", "tokens": ["[2]"] } ] }"#,
    )
    .expect("inline fixture should parse");
    let err = run_command_conformance_with_fixture(&cfg, &fixture)
        .expect_err("case without expectation must be rejected");
    assert!(err.contains("exactly one"));
}

#[test]
fn resolution_is_syntax_independent_across_the_surface() {
    let probe = false;
    let pairs: [(&str, &[&str], &[&str]); 5] = [
        ("zeros", &["[2,3]", "int32"], &["-dtype", "int32", "-shape", "[2,3]"]),
        ("full", &["[1]", "4", "float64"], &["-value", "4", "-shape", "[1]", "-dtype", "float64"]),
        ("eye", &["3", "4"], &["-m", "4", "-n", "3"]),
        ("arange", &["0", "6", "2"], &["-step", "2", "-end", "6"]),
        ("randint_like", &["t", "5", "1"], &["-low", "1", "-high", "5", "-input", "t"]),
    ];
    for (name, positional, named) in pairs {
        let schema = Command::from_name(name).expect("known command").schema();
        let lhs = resolve(schema, positional, &probe).expect("positional resolves");
        let rhs = resolve(schema, named, &probe).expect("named resolves");
        assert_eq!(lhs.syntax, SyntaxForm::Positional);
        assert_eq!(rhs.syntax, SyntaxForm::Named);
        assert_eq!(lhs.params, rhs.params, "{name}");
    }
}

#[test]
fn script_runner_threads_handles_between_lines() {
    let mut session = CommandSession::host(SessionConfig::default());
    let script = "\
src = arange 0 6 2 int64
copy = full_like $src 9
randint_like $copy 3 -requiresGrad true
";
    let report = run_script(&mut session, script);
    assert_eq!(report.failures(), 0);
    let last = report.lines[2].result.clone().expect("last line succeeds");
    let tensor = session.tensor(&last).expect("tensor registered");
    assert_eq!(tensor.meta().shape(), &[3]);
    assert!(tensor.requires_grad());

    let resolution = session
        .resolve("arange", &["0", "6", "2", "int64"])
        .expect("arange resolves");
    assert_eq!(resolution.params.number(ParamKey::Step), Ok(2.0));
}
