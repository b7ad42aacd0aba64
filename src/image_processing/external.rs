use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of an external command that exited successfully
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `command`, optionally feeding `input` on stdin, and wait at most `timeout`.
///
/// The child is killed when the timeout expires. A non-zero exit status is an
/// error carrying the child's stderr.
pub fn run_with_timeout(
    mut command: Command,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let program = command.get_program().to_string_lossy().to_string();

    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to execute {}", program))?;

    let stdin_writer = match (child.stdin.take(), input) {
        (Some(mut stdin), Some(bytes)) => Some(thread::spawn(move || {
            match stdin.write_all(&bytes) {
                // The child may exit without reading everything
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        })),
        _ => None,
    };
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("Failed to wait for {}", program))?
        {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!(
                "{} timed out after {}s",
                program,
                timeout.as_secs()
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    if let Some(writer) = stdin_writer {
        writer
            .join()
            .map_err(|_| anyhow!("stdin writer for {} panicked", program))?
            .with_context(|| format!("Failed to write to {}", program))?;
    }
    let stdout = collect(stdout_reader, &program)?;
    let stderr = collect(stderr_reader, &program)?;

    if !status.success() {
        return Err(anyhow!(
            "{} failed ({}): {}",
            program,
            status,
            String::from_utf8_lossy(&stderr).trim()
        ));
    }

    Ok(CommandOutput { stdout, stderr })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(
    reader: Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    program: &str,
) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("output reader for {} panicked", program))?
            .with_context(|| format!("Failed to read output of {}", program)),
        None => Ok(Vec::new()),
    }
}

/// Split a configured command line such as `rembg i` into program and arguments
pub fn split_command_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_is_piped_through() {
        let output = run_with_timeout(
            Command::new("cat"),
            Some(b"portrait".to_vec()),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(output.stdout, b"portrait");
    }

    #[test]
    fn test_non_zero_exit_reports_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo broken >&2; exit 3"]);

        let err = run_with_timeout(command, None, Duration::from_secs(10)).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut command = Command::new("sleep");
        command.arg("5");

        let started = Instant::now();
        let err = run_with_timeout(command, None, Duration::from_millis(100)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let err = run_with_timeout(
            Command::new("definitely-not-a-real-program-xyz"),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line("rembg  i"),
            Some(("rembg".to_string(), vec!["i".to_string()]))
        );
        assert_eq!(split_command_line("   "), None);
    }
}
