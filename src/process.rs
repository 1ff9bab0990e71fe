// src/process.rs

//! Child processes with a deadline
//!
//! Output is drained on reader threads while waiting. A child producing
//! more than a pipe buffer of output would otherwise block on write and
//! only ever end by timing out.

use std::io::{self, Read};
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Exit status and output of a finished child
#[derive(Debug)]
pub(crate) struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Wait for `child` for at most `timeout`, collecting its piped output
///
/// Returns `Ok(None)` after killing a child that did not finish in time.
/// Pipes that were not set up as `Stdio::piped()` read as empty.
pub(crate) fn wait_captured(mut child: Child, timeout: Duration) -> io::Result<Option<Captured>> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let Some(status) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        // grandchildren may still hold the pipes; leave the readers detached
        return Ok(None);
    };

    Ok(Some(Captured {
        status,
        stdout: collect(stdout)?,
        stderr: collect(stderr)?,
    }))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<String> {
    let bytes = reader
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn sh(script: &str) -> Child {
        Command::new("/bin/sh")
            .args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    #[test]
    fn test_large_output_does_not_stall() {
        // well past a 64 KiB pipe buffer on both streams
        let child = sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done");
        let captured = wait_captured(child, Duration::from_secs(30)).unwrap().unwrap();

        assert!(captured.status.success());
        assert_eq!(captured.stdout.lines().count(), 20000);
        assert_eq!(captured.stderr.lines().last(), Some("err-19999"));
    }

    #[test]
    fn test_timeout_kills_child() {
        let child = sh("sleep 5");
        let start = std::time::Instant::now();
        assert!(wait_captured(child, Duration::from_millis(200)).unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_exit_status_kept() {
        let captured = wait_captured(sh("echo out; exit 3"), Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(captured.status.code(), Some(3));
        assert_eq!(captured.stdout.trim(), "out");
    }
}
