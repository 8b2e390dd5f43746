//! FFmpeg process management.
//!
//! Spawns ffmpeg, forwards its stderr to the log, and stops it cleanly
//! when Ctrl+C is pressed.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::EncodingError;
use crate::interrupt::ctrlc_received;

/// How much ffmpeg stderr is attached to a failure.
const STDERR_TAIL_LINES: usize = 20;

/// Grace period between SIGINT and SIGKILL.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running ffmpeg process.
pub struct FfmpegProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
}

impl FfmpegProcess {
    /// Spawn `program` (normally `ffmpeg`) with `args`.
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, EncodingError> {
        log::debug!("{} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncodingError::FfmpegNotFound
                } else {
                    EncodingError::Spawn(e)
                }
            })?;

        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let reader = BufReader::new(stderr);
                let mut lines = Vec::new();
                for line in reader.lines() {
                    match line {
                        Ok(l) => {
                            log::debug!("[ffmpeg] {}", l);
                            lines.push(l);
                        }
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        Ok(Self {
            child,
            stderr_thread,
        })
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for ffmpeg to finish. Ctrl+C stops it and yields
    /// `EncodingError::Interrupted`; a non-zero exit yields
    /// `EncodingError::ProcessFailed` with the tail of stderr.
    pub fn wait(mut self) -> Result<(), EncodingError> {
        loop {
            if ctrlc_received() {
                let _ = self.shutdown();
                return Err(EncodingError::Interrupted);
            }

            match self.child.try_wait() {
                Ok(Some(status)) => return self.finish(status),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(EncodingError::Io(e)),
            }
        }
    }

    fn finish(&mut self, status: ExitStatus) -> Result<(), EncodingError> {
        let stderr = self.take_stderr_output();
        if status.success() {
            return Ok(());
        }

        let start = stderr.len().saturating_sub(STDERR_TAIL_LINES);
        Err(EncodingError::ProcessFailed {
            exit_code: status.code(),
            stderr: stderr[start..].join("\n"),
        })
    }

    /// Send SIGINT, then kill if ffmpeg has not exited after the grace period.
    pub fn shutdown(&mut self) -> Result<ExitStatus, EncodingError> {
        #[cfg(unix)]
        {
            unsafe {
                let pid = self.child.id() as i32;
                libc::kill(pid, libc::SIGINT);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let start = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start.elapsed() > SHUTDOWN_TIMEOUT {
                        let _ = self.child.kill();
                        return self.child.wait().map_err(EncodingError::Io);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(EncodingError::Io(e)),
            }
        }
    }

    /// Get the collected stderr output after the process has finished.
    pub fn take_stderr_output(&mut self) -> Vec<String> {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}

/// Run ffmpeg to completion.
pub fn run(program: &str, args: &[String]) -> Result<(), EncodingError> {
    FfmpegProcess::spawn(program, args)?.wait()
}

/// Fail early with `FfmpegNotFound` if `program` cannot be started.
pub fn check_available(program: &str) -> Result<(), EncodingError> {
    match Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EncodingError::FfmpegNotFound),
        Err(e) => Err(EncodingError::Spawn(e)),
    }
}
