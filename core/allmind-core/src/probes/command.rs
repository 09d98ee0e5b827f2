//! Bounded execution of external commands.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ProbeError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `program args...` in `cwd` and returns trimmed stdout.
///
/// The child is killed once `timeout` elapses. Output pipes are drained on
/// their own threads so a chatty command cannot stall on a full pipe.
pub(crate) fn run(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let display = describe(program, args);

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_OPTIONAL_LOCKS", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| ProbeError::Spawn {
            command: display.clone(),
            details: err.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProbeError::Timeout {
                command: display,
                after: timeout,
            });
        }
        Err(err) => return Err(ProbeError::io(format!("waiting on {display}"), &err)),
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);

    if !status.success() {
        return Err(ProbeError::NonZeroExit {
            command: display,
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(stdout.trim().to_string())
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn describe(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_trimmed_stdout() {
        let cwd = std::env::temp_dir();
        let out = run("sh", &["-c", "echo '  hello  '"], &cwd, Duration::from_secs(5)).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let cwd = std::env::temp_dir();
        let err = run(
            "sh",
            &["-c", "echo nope >&2; exit 3"],
            &cwd,
            Duration::from_secs(5),
        )
        .unwrap_err();
        match err {
            ProbeError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn hung_command_times_out() {
        let cwd = std::env::temp_dir();
        let started = Instant::now();
        let err = run("sleep", &["5"], &cwd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let cwd = std::env::temp_dir();
        let err = run(
            "definitely-not-a-real-binary-allmind",
            &[],
            &cwd,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }
}
