#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

impl CmdResult {
    /// Parse the single JSON line printed in `--json` mode.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim()).unwrap_or_else(|err| {
            panic!(
                "stdout is not one JSON document ({err}); see {}",
                self.log_path.display()
            )
        })
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_fidx") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "fidx.exe" } else { "fidx" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve fidx binary path for integration test"),
    }
}

/// Run `fidx` with `home` as `$HOME`, so no real config or activity log is touched.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, home, args, &[])
}

pub fn run_cli_case_with_env(
    case_name: &str,
    home: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> CmdResult {
    let root = std::env::temp_dir().join("fidx-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home)
        .env_remove("FIDX_OUTPUT_FORMAT")
        .env_remove("FIDX_LOG_PATH")
        .env_remove("FIDX_LOG_ENABLED")
        .env("RUST_BACKTRACE", "1");
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("execute fidx command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Small fixed tree used by the CLI cases:
///
/// ```text
/// root/
///   README.md
///   docs/readme.txt
///   src/main.rs
///   src/Main.java
///   src/lib/          (empty directory)
/// ```
pub fn sample_tree(root: &Path) {
    fs::create_dir_all(root.join("docs")).expect("mkdir docs");
    fs::create_dir_all(root.join("src").join("lib")).expect("mkdir src/lib");
    fs::write(root.join("README.md"), b"# fidx\n").expect("write README");
    fs::write(root.join("docs").join("readme.txt"), b"x").expect("write readme.txt");
    fs::write(root.join("src").join("main.rs"), b"fn main() {}\n").expect("write main.rs");
    fs::write(root.join("src").join("Main.java"), b"class Main {}\n").expect("write Main.java");
}
