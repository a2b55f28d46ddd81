use anyhow::{Context, Result};
use std::process::{Command, ExitStatus, Output, Stdio};

/// Environment passed to a child process
pub type Env<'a> = &'a [(String, String)];

/// Build a command from a program and args, or a shell line when `args` is None
fn build(program: &str, args: Option<&[&str]>, env: Env<'_>) -> Command {
    let mut cmd = match args {
        Some(args) => {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        }
        None => {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(program);
            cmd
        }
    };
    cmd.envs(env.iter().map(|(k, v)| (k, v)));
    cmd
}

fn describe(program: &str, args: Option<&[&str]>) -> String {
    match args {
        Some(args) if !args.is_empty() => format!("{program} {}", args.join(" ")),
        _ => program.to_string(),
    }
}

/// Run and capture output; a non-zero exit is an error carrying stderr
pub fn run_capture(program: &str, args: Option<&[&str]>, env: Env<'_>) -> Result<String> {
    let output = run_output(program, args, env)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        anyhow::bail!("exit {code}: {}", stderr.trim())
    }
}

/// Run and return the raw output, whatever the exit status
pub fn run_output(program: &str, args: Option<&[&str]>, env: Env<'_>) -> Result<Output> {
    log::debug!("exec: {}", describe(program, args));
    build(program, args, env)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute: {}", describe(program, args)))
}

/// Run with inherited stdio (interactive)
pub fn run_interactive(program: &str, args: Option<&[&str]>, env: Env<'_>) -> Result<ExitStatus> {
    log::debug!("exec (interactive): {}", describe(program, args));
    build(program, args, env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to execute: {}", describe(program, args)))
}

/// Run silently, returning success/failure
pub fn run_quiet(program: &str, args: Option<&[&str]>, env: Env<'_>) -> bool {
    build(program, args, env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Start a detached child with null stdio
pub fn spawn_detached(program: &str, args: &[&str]) -> Result<u32> {
    log::debug!("spawn: {}", describe(program, Some(args)));
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to spawn: {}", describe(program, Some(args))))?;
    Ok(child.id())
}
