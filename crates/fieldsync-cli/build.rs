//! Embeds the release version and, when built from a checkout, the commit.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=FIELDSYNC_BUILD_COMMIT");

    let release = env!("CARGO_PKG_VERSION");
    let version = match build_commit() {
        Some(commit) => format!("{} ({})", release, commit),
        None => release.to_string(),
    };

    println!("cargo:rustc-env=FIELDSYNC_VERSION={}", version);
}

/// The commit being built: `FIELDSYNC_BUILD_COMMIT` for packaged builds,
/// otherwise the short hash of HEAD, marked when the tree is dirty.
fn build_commit() -> Option<String> {
    if let Ok(commit) = std::env::var("FIELDSYNC_BUILD_COMMIT") {
        let commit = commit.trim();
        if !commit.is_empty() {
            return Some(commit.to_string());
        }
    }

    let output = Command::new("git")
        .args(["describe", "--always", "--dirty=+", "--abbrev=10", "--exclude=*"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let commit = String::from_utf8(output.stdout).ok()?;
    let commit = commit.trim();
    (!commit.is_empty()).then(|| commit.to_string())
}
