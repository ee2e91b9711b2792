// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=FRAMESCONV_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = std::env::var("FRAMESCONV_VERSION").unwrap_or_else(|_| git_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// "0.1.0-abcdef1" at a tag, "0.1.0-5-abcdef1" five commits past it,
/// the crate version when there is no git checkout
fn git_version() -> String {
    let package = env!("CARGO_PKG_VERSION").to_string();
    let Some(described) = git(&["describe", "--tags", "--always", "--match", "v*"]) else {
        return package;
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [hash, commits, tag] => {
            let hash = hash.strip_prefix('g').unwrap_or(hash);
            format!("{}-{}-{}", tag, commits, hash)
        }
        // No tag reachable, describe printed a bare hash
        _ if !described.contains('.') => format!("{}-{}", package, described),
        _ => match git(&["rev-parse", "--short", "HEAD"]) {
            Some(hash) => format!("{}-{}", described, hash),
            None => described.to_string(),
        },
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
