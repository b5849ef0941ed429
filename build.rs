use std::process::Command;

/// Short commit hash, `-dirty` when the work tree has changes
fn git_revision() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let rev = String::from_utf8_lossy(&out.stdout).trim().to_string();

    let dirty = Command::new("git")
        .args(["diff", "--quiet"])
        .status()
        .map(|s| !s.success())
        .unwrap_or(false);

    Some(if dirty { format!("{rev}-dirty") } else { rev })
}

fn main() {
    let rev = git_revision().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=ESCROW_DESK_REVISION={rev}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
    println!("cargo:rerun-if-changed=migrations");
}
