//! Embeds the source revision and build timestamp reported by `--version`
//! and `GET /version`.

use std::process::Command;

use chrono::{SecondsFormat, Utc};

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn main() {
    let revision = std::env::var("ELCHI_GIT_HASH")
        .ok()
        .or_else(|| git(&["describe", "--always", "--dirty", "--abbrev=10"]))
        .unwrap_or_else(|| "unknown".to_string());
    let built_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    println!("cargo:rustc-env=GIT_HASH={}", revision);
    println!("cargo:rustc-env=BUILD_TIME={}", built_at);

    println!("cargo:rerun-if-env-changed=ELCHI_GIT_HASH");
    if let Some(head) = git(&["rev-parse", "--git-path", "HEAD"]) {
        println!("cargo:rerun-if-changed={}", head);
    }
}
