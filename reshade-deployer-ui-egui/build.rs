use std::process::Command;

// Shown on the About tab next to the package version.
fn main() {
	let commit = Command::new("git")
		.args(["rev-parse", "--short", "HEAD"])
		.output()
		.ok()
		.filter(|o| o.status.success())
		.and_then(|o| String::from_utf8(o.stdout).ok())
		.map(|s| s.trim().to_string())
		.filter(|s| !s.is_empty())
		.unwrap_or_else(|| "unknown".to_string());
	println!("cargo:rustc-env=GIT_COMMIT_HASH={commit}");
	println!("cargo:rerun-if-changed=../.git/HEAD");
}
