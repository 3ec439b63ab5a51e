//! Binary smoke tests. Each case gets its own `$HOME` and config file.

mod common;

use common::{last_json, run_cli_case, write_config};

#[test]
fn help_and_version_print() {
    let home = tempfile::tempdir().unwrap();
    let help = run_cli_case("help", home.path(), &["--help"]);
    assert!(help.status.success());
    assert!(help.stdout.contains("Data-driven control panel"));
    for sub in ["run", "check", "exec", "commands", "status", "seed", "config"] {
        assert!(help.stdout.contains(sub), "help lacks {sub}");
    }

    let version = run_cli_case("version", home.path(), &["--version"]);
    assert!(version.status.success());
    assert!(version.stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn config_path_and_validate_report_json() {
    let home = tempfile::tempdir().unwrap();
    let cfg = write_config(home.path(), "[scheduler]\ninterval_ms = 750\n");
    let cfg = cfg.to_str().unwrap();

    let path = run_cli_case(
        "config-path",
        home.path(),
        &["--config", cfg, "config", "path", "--json"],
    );
    assert!(path.status.success(), "log: {}", path.log_path.display());
    let json = last_json(&path);
    assert_eq!(json["exists"], true);
    assert_eq!(json["path"], cfg);

    let valid = run_cli_case(
        "config-validate",
        home.path(),
        &["--config", cfg, "config", "validate", "--json"],
    );
    assert!(valid.status.success(), "log: {}", valid.log_path.display());
    let json = last_json(&valid);
    assert_eq!(json["valid"], true);
    assert_eq!(json["hash"].as_str().map(str::len), Some(16));

    let show = run_cli_case(
        "config-show",
        home.path(),
        &["--config", cfg, "config", "show", "--json"],
    );
    assert!(show.status.success());
    assert_eq!(last_json(&show)["config"]["scheduler"]["interval_ms"], 750);
}

#[test]
fn invalid_config_exits_with_user_error() {
    let home = tempfile::tempdir().unwrap();
    let cfg = write_config(home.path(), "[scheduler]\ninterval_ms = \"fast\"\n");
    let cfg = cfg.to_str().unwrap();

    let result = run_cli_case(
        "config-invalid",
        home.path(),
        &["--config", cfg, "config", "validate", "--json"],
    );
    assert_eq!(result.status.code(), Some(1));
    let json = last_json(&result);
    assert_eq!(json["valid"], false);
    assert_eq!(json["code"], "DM-1003");

    let missing = home.path().join("nope.toml");
    let result = run_cli_case(
        "config-missing",
        home.path(),
        &["--config", missing.to_str().unwrap(), "commands"],
    );
    assert_eq!(result.status.code(), Some(1));
    assert!(result.stderr.contains("DM-1002"), "stderr: {}", result.stderr);
}

#[test]
fn seed_then_check_reports_rows_and_fingerprints() {
    let home = tempfile::tempdir().unwrap();
    let cfg = write_config(home.path(), "");
    let cfg = cfg.to_str().unwrap();

    let seed = run_cli_case("seed", home.path(), &["--config", cfg, "seed", "--json"]);
    assert!(seed.status.success(), "log: {}", seed.log_path.display());
    assert_eq!(last_json(&seed)["seeded"], true);

    let again = run_cli_case("seed-again", home.path(), &["--config", cfg, "seed", "--json"]);
    let json = last_json(&again);
    assert_eq!(json["seeded"], false);
    assert_eq!(json["existing_pages"], 2);

    let page1 = run_cli_case("check-1", home.path(), &["--config", cfg, "check", "--json"]);
    assert!(page1.status.success(), "log: {}", page1.log_path.display());
    let json = last_json(&page1);
    assert_eq!(json["page"], 1);
    assert_eq!(json["malformed"], 0);
    let labels: Vec<&str> = json["buttons"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["describe"].as_str())
        .collect();
    assert_eq!(labels.len(), 3, "{labels:?}");
    assert!(labels.iter().any(|l| l.contains("Page 2")));
    assert_eq!(json["buttons_fingerprint"].as_str().map(str::len), Some(64));

    let page2 = run_cli_case(
        "check-2",
        home.path(),
        &["--config", cfg, "check", "--page", "2", "--json"],
    );
    let json2 = last_json(&page2);
    assert_eq!(json2["page_row"]["web_url"], "https://example.com");
    assert_ne!(json2["page_fingerprint"], json["page_fingerprint"]);

    // Same data, same fingerprint.
    let repeat = run_cli_case("check-1-again", home.path(), &["--config", cfg, "check", "--json"]);
    assert_eq!(last_json(&repeat)["buttons_fingerprint"], json["buttons_fingerprint"]);
}

#[test]
fn exec_reports_each_token_and_fails_on_unknown_command() {
    let home = tempfile::tempdir().unwrap();
    let cfg = write_config(home.path(), "");
    let cfg = cfg.to_str().unwrap();

    let ok = run_cli_case(
        "exec-ok",
        home.path(),
        &["--config", cfg, "exec", "switch_page:3 && refresh", "--json"],
    );
    assert!(ok.status.success(), "log: {}", ok.log_path.display());
    let json = last_json(&ok);
    assert_eq!(json["page"], 3);
    assert_eq!(json["refresh_requested"], true);

    let bad = run_cli_case(
        "exec-bad",
        home.path(),
        &["--config", cfg, "exec", "nope && next_page", "--json"],
    );
    assert_eq!(bad.status.code(), Some(1));
    let json = last_json(&bad);
    let tokens = json["tokens"].as_array().unwrap();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0]["status"], "unresolved");
    assert_eq!(tokens[0]["error_code"], "DM-3001");
    assert_eq!(tokens[1]["status"], "invoked");
    assert_eq!(json["page"], 2);

    let param = run_cli_case(
        "exec-param",
        home.path(),
        &["--config", cfg, "exec", "switch_page:zero", "--json"],
    );
    assert_eq!(param.status.code(), Some(1));
    assert_eq!(last_json(&param)["tokens"][0]["error_code"], "DM-3003");
}

#[test]
fn commands_lists_builtin_navigation() {
    let home = tempfile::tempdir().unwrap();
    let cfg = write_config(home.path(), "");
    let result = run_cli_case(
        "commands",
        home.path(),
        &["--config", cfg.to_str().unwrap(), "commands", "--json"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let json = last_json(&result);
    let names: Vec<&str> = json["commands"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    for name in ["next_page", "previous_page", "refresh", "switch_page"] {
        assert!(names.contains(&name), "missing {name}: {names:?}");
    }
}

#[test]
fn status_without_state_file_reports_not_running() {
    let home = tempfile::tempdir().unwrap();
    let cfg = write_config(home.path(), "");
    let result = run_cli_case(
        "status",
        home.path(),
        &["--config", cfg.to_str().unwrap(), "status", "--json"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(last_json(&result)["running"], false);
}
