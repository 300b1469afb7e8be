//! The single place external commands (git, the forge CLI) are spawned from.

use std::process::Command;
use std::time::Instant;

/// Run a command, logging its invocation and timing at debug level.
///
/// This is the **only** way external commands should be run in this crate,
/// so every subprocess invocation goes through uniform logging.
pub fn run(cmd: &mut Command, context: Option<&str>) -> std::io::Result<std::process::Output> {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
    let cmd_str = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    match context {
        Some(ctx) => log::debug!("$ {} [{}]", cmd_str, ctx),
        None => log::debug!("$ {}", cmd_str),
    }

    let t0 = Instant::now();
    let result = cmd.output();
    let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

    match &result {
        Ok(output) => log::debug!("cmd=\"{cmd_str}\" dur={duration_ms:.1}ms ok={}", output.status.success()),
        Err(e) => log::debug!("cmd=\"{cmd_str}\" dur={duration_ms:.1}ms err=\"{e}\""),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let output = run(&mut cmd, None).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[test]
    fn run_surfaces_failure() {
        let mut cmd = Command::new("false");
        let output = run(&mut cmd, Some("test")).unwrap();
        assert!(!output.status.success());
    }
}
