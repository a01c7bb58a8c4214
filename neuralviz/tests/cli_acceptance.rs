use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
    projects: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");
        let projects = home.join(".claude/projects/-work-demo");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");
        fs::create_dir_all(&projects).expect("failed to create projects dir");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
            projects,
        }
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../neuralviz-core/tests/fixtures")
        .join(name)
}

fn run_bin(env: &CliTestEnv, bin_name: &str, args: &[&str], extra_env: &[(&str, &str)]) -> Output {
    let bin_path = match bin_name {
        "neuralviz" => PathBuf::from(assert_cmd::cargo::cargo_bin!("neuralviz")),
        "neuralviz-bridge" => PathBuf::from(assert_cmd::cargo::cargo_bin!("neuralviz-bridge")),
        "neuralviz-debug-log" => {
            PathBuf::from(assert_cmd::cargo::cargo_bin!("neuralviz-debug-log"))
        }
        _ => panic!("unsupported binary in test harness: {bin_name}"),
    };

    let mut command = Command::new(bin_path);
    command
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("PORT")
        .env_remove("DEPLOY_MODE")
        .env_remove("NEURAL_VIZ_API_KEY");
    for (key, value) in extra_env {
        command.env(key, value);
    }
    command
        .output()
        .unwrap_or_else(|e| panic!("failed to execute {bin_name}: {e}"))
}

fn assert_success(bin_name: &str, args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "{bin_name} {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn debug_log_normalizes_fixture() {
    let env = CliTestEnv::new();
    let path = fixture("session-basic.jsonl");
    let path = path.to_str().expect("fixture path is not UTF-8");
    let args = ["--compact", path];

    let output = run_bin(&env, "neuralviz-debug-log", &args, &[]);
    assert_success("neuralviz-debug-log", &args, &output);

    let parsed: Value = serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
    assert_eq!(parsed["session_id"], "session-basic");
    assert_eq!(parsed["stats"]["lines"], 9);
    assert_eq!(parsed["stats"]["events"], 7);
    assert_eq!(parsed["stats"]["skipped"], 2);
    assert_eq!(parsed["stats"]["by_kind"]["action"], 2);
    assert_eq!(parsed["stats"]["edges"], 6);

    let events = parsed["events"].as_array().expect("events array");
    assert_eq!(events.len(), 7);
    assert_eq!(events[0]["kind"], "prompt");
    assert_eq!(events[3]["label"], "Result: Read");
}

#[test]
fn debug_log_emits_viewer_messages() {
    let env = CliTestEnv::new();
    let path = fixture("session-basic.jsonl");
    let path = path.to_str().expect("fixture path is not UTF-8");
    let args = ["--messages", "--session", "demo", path];

    let output = run_bin(&env, "neuralviz-debug-log", &args, &[]);
    assert_success("neuralviz-debug-log", &args, &output);

    let parsed: Value = serde_json::from_slice(&output.stdout).expect("stdout is not JSON");
    assert_eq!(parsed["session_id"], "demo");
    assert!(parsed.get("events").is_none());

    let messages = parsed["messages"].as_array().expect("messages array");
    assert_eq!(messages[0]["type"], "session_start");
    assert_eq!(messages[0]["payload"]["sessionId"], "demo");
    assert_eq!(messages[1]["type"], "node_add");
    assert!(messages.iter().any(|m| m["type"] == "node_update"));
}

#[test]
fn debug_log_fails_without_readable_files() {
    let env = CliTestEnv::new();
    let missing = env.home.join("missing.jsonl");
    let missing = missing.to_str().expect("path is not UTF-8");

    let output = run_bin(&env, "neuralviz-debug-log", &[missing], &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("File not found"), "stderr:\n{stderr}");
}

#[test]
fn server_refuses_remote_mode_without_api_key() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, "neuralviz", &[], &[("DEPLOY_MODE", "remote")]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr:\n{stderr}");
}

#[test]
fn server_rejects_unreadable_config() {
    let env = CliTestEnv::new();
    let config = env.xdg_config.join("broken.toml");
    fs::write(&config, "[server\nport = ").expect("failed to write config");
    let config = config.to_str().expect("path is not UTF-8");

    let output = run_bin(&env, "neuralviz", &["--config", config], &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load configuration"), "stderr:\n{stderr}");
}

#[test]
fn bridge_requires_projects_directory() {
    let env = CliTestEnv::new();
    let missing = env.home.join("nowhere");
    let missing = missing.to_str().expect("path is not UTF-8");
    let args = ["--projects", missing];

    let output = run_bin(&env, "neuralviz-bridge", &args, &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("projects directory not found"),
        "stderr:\n{stderr}"
    );
    assert!(env.projects.exists());
}
