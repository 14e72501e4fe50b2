use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::fs;

/// Writes a candidate script that reads the graph header from stdin and
/// reports it back as a result payload.
const FAKE_CANDIDATE: &str = r#"
out=""
for arg in "$@"; do
    case "$arg" in
        --output_file=*) out="${arg#--output_file=}" ;;
    esac
done
read v e t
cat > "$out" <<EOF
{"graph_type":"GRAPH_TYPE","V":$v,"E":$e,"T":$t,
 "build_time_ms":2.5,"has_edge_time_ms":0.1,"neighbours_time_ms":0.2,"aggregate_time_ms":0.3,
 "graph_rss_kb":64,"max_rss_kb":512,"has_edge_epochs":10,"neighbours_epochs":10,"aggregate_epochs":10}
EOF
"#;

fn tgbench_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tgbench").unwrap();
    cmd.env("HOME", home.path().to_str().unwrap());
    cmd.env("XDG_CONFIG_HOME", home.path().join(".config").to_str().unwrap());
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Workspace with `v0..versions`, plus a config pointing the sweep at it.
fn setup_sweep(versions: u32, candidate: &str) -> (TempDir, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    for v in 0..versions {
        let dir = tmp.path().join(format!("v{}", v));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("main.sh"),
            candidate.replace("GRAPH_TYPE", &format!("Fake{}", v)),
        )
        .unwrap();
    }

    let config = format!(
        r#"
vertices = 4
edges = [3, 5]
timestamps = 100
versions = "all"
workspace = "{root}"
datapath = "{root}/data/graph.txt"
binary = "sh {{workspace}}/v{{version}}/main.sh"
build_command = []
database = "{root}/results.sqlite"
seed = 11
timeout_secs = 30
"#,
        root = tmp.path().display()
    );
    let config_path = tmp.path().join("tgbench.toml");
    fs::write(&config_path, config).unwrap();
    (tmp, config_path)
}

// ---- generate / inspect ----

#[test]
fn generate_to_stdout() {
    let home = TempDir::new().unwrap();
    let output = tgbench_cmd(&home)
        .args(["generate", "-V", "4", "-E", "3", "-T", "100", "--seed", "7"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("4 3 100"));
    let rest: Vec<&str> = lines.collect();
    assert_eq!(rest.len(), 4);

    let total: usize = rest
        .iter()
        .map(|line| line.split_whitespace().next().unwrap().parse::<usize>().unwrap())
        .sum();
    assert_eq!(total, 3);
}

#[test]
fn generate_is_deterministic_with_seed() {
    let home = TempDir::new().unwrap();
    let run = || {
        tgbench_cmd(&home)
            .args(["generate", "-V", "20", "-E", "50", "-T", "1000", "--seed", "42"])
            .output()
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn generate_static_strategy_uses_time_zero() {
    let home = TempDir::new().unwrap();
    let output = tgbench_cmd(&home)
        .args([
            "generate", "-V", "3", "-E", "4", "-T", "100", "--seed", "1", "--strategy", "static",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    for line in stdout.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        for triple in fields[1..].chunks(3) {
            assert_eq!(triple[1], "0");
            assert_eq!(triple[2], "0");
        }
    }
}

#[test]
fn generate_then_inspect() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("nested/dir/graph.txt");

    tgbench_cmd(&home)
        .args(["generate", "-V", "10", "-E", "25", "-T", "500", "--seed", "3", "--output"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    tgbench_cmd(&home)
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("V = 10, E = 25, T = 500"))
        .stdout(predicate::str::contains("entries: 25"));
}

#[test]
fn generate_rejects_zero_vertices() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home)
        .args(["generate", "-V", "0", "-E", "3", "-T", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vertex count must be positive"));
}

#[test]
fn generate_rejects_negative_edges() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home)
        .args(["generate", "-V", "4", "-E", "-1", "-T", "100"])
        .assert()
        .failure();
}

#[test]
fn inspect_reports_malformed_file() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("bad.txt");
    fs::write(&path, "2 1 10\n1 1 0 5\n").unwrap();

    tgbench_cmd(&home)
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line"));
}

#[test]
fn inspect_rejects_padded_file() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("padded.txt");
    fs::write(&path, "2 1 10\n1 1 0 5\n0\n0 junk\n").unwrap();

    tgbench_cmd(&home)
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 4"));
}

// ---- run ----

#[cfg(unix)]
#[test]
fn run_reports_exit_code() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home)
        .args(["run", "--shell", "--", "exit 3"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("return code"))
        .stdout(predicate::str::contains("max_rss_memory"));
}

#[cfg(unix)]
#[test]
fn run_json_output() {
    let home = TempDir::new().unwrap();
    let output = tgbench_cmd(&home)
        .args(["run", "--json", "--", "sleep", "0.2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["exit_code"], 0);
    assert!(value["baseline_rss"].is_u64());
    assert!(value["peak_rss"].is_i64());
    assert!(value["max_rss_kb"].is_i64());
    assert!(value["elapsed"].as_f64().unwrap() >= 150.0);
    assert!(value["samples"].as_array().is_some_and(|s| !s.is_empty()));
}

#[cfg(unix)]
#[test]
fn run_timeout_fails() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home)
        .args(["run", "--timeout-secs", "1", "--", "sleep", "30"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .failure()
        .stderr(predicate::str::contains("timeout"));
}

#[test]
fn run_missing_binary_fails() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home)
        .args(["run", "--", "/nonexistent/tgbench-candidate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/tgbench-candidate"));
}

#[test]
fn run_requires_command() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home).arg("run").assert().failure();
}

// ---- sweep / results ----

#[cfg(unix)]
#[test]
fn sweep_runs_every_combination() {
    let (tmp, config) = setup_sweep(2, FAKE_CANDIDATE);

    tgbench_cmd(&tmp)
        .args(["sweep", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Run Version 0"))
        .stdout(predicate::str::contains("Run Version 1"))
        .stdout(predicate::str::contains("4 run(s) completed, 0 failed"));

    assert!(tmp.path().join("data/graph.txt").exists());

    let output = tgbench_cmd(&tmp)
        .args(["results", "--json", "--database"])
        .arg(tmp.path().join("results.sqlite"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r["V"] == 4 && r["T"] == 100));
}

#[cfg(unix)]
#[test]
fn sweep_twice_keeps_first_rows() {
    let (tmp, config) = setup_sweep(1, FAKE_CANDIDATE);

    for _ in 0..2 {
        tgbench_cmd(&tmp)
            .args(["sweep", "--config"])
            .arg(&config)
            .assert()
            .success();
    }

    tgbench_cmd(&tmp)
        .args(["sweep", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("already stored"));
}

#[cfg(unix)]
#[test]
fn sweep_only_selects_versions() {
    let (tmp, config) = setup_sweep(3, FAKE_CANDIDATE);

    tgbench_cmd(&tmp)
        .args(["sweep", "--only", "2", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Run Version 2"))
        .stdout(predicate::str::contains("Run Version 0").not())
        .stdout(predicate::str::contains("2 run(s) completed"));
}

#[cfg(unix)]
#[test]
fn sweep_failure_exits_nonzero_but_finishes() {
    let (tmp, config) = setup_sweep(1, "exit 4\n");

    tgbench_cmd(&tmp)
        .args(["sweep", "--config"])
        .arg(&config)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("0 run(s) completed, 2 failed"))
        .stdout(predicate::str::contains("status 4"));
}

#[test]
fn sweep_rejects_unknown_config_key() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "verticies = 4\n").unwrap();

    tgbench_cmd(&tmp)
        .args(["sweep", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("verticies"));
}

#[test]
fn results_on_empty_database() {
    let tmp = TempDir::new().unwrap();
    tgbench_cmd(&tmp)
        .args(["results", "--database"])
        .arg(tmp.path().join("empty.sqlite"))
        .assert()
        .success()
        .stdout(predicate::str::contains("g_type"))
        .stdout(predicate::str::contains("(no results stored)"));
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    tgbench_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("sweep"))
        .stdout(predicate::str::contains("results"));
}
