use std::process::Command;


fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Prefers a value already exported by the caller (CI builds from a source
/// tarball have no `.git`), falling back to probing the checkout.
fn emit(key: &str, probe: impl FnOnce() -> Option<String>) {
    println!("cargo:rerun-if-env-changed={key}");
    if let Some(value) = std::env::var(key).ok().filter(|v| !v.is_empty()).or_else(probe) {
        println!("cargo:rustc-env={key}={value}");
    }
}

fn main() {
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    emit("GBP_GIT_COMMIT", || capture("git", &["rev-parse", "--short=10", "HEAD"]));
    emit("GBP_GIT_BRANCH", || {
        capture("git", &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
    });
    emit("GBP_BUILD_TIMESTAMP", || capture("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]));
}
