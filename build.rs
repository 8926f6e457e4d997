fn main() {
    // Release builds set these in the environment; local builds fall back
    // to the git and date commands.
    let git_sha = env_or("GIT_SHA", || {
        command_output("git", &["rev-parse", "--short", "HEAD"])
    });
    let build_date = env_or("BUILD_DATE", || command_output("date", &["+%Y-%m-%d"]));

    println!("cargo:rustc-env=GIT_SHA={}", git_sha);
    println!("cargo:rustc-env=BUILD_DATE={}", build_date);
}

fn env_or(name: &str, fallback: impl FnOnce() -> String) -> String {
    std::env::var(name).unwrap_or_else(|_| fallback())
}

fn command_output(program: &str, args: &[&str]) -> String {
    std::process::Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
