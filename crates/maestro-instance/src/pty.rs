//! PTY session: spawn, serialized writes, interrupt, kill.
//!
//! The blocking PTY reader runs on a dedicated thread and bridges chunks
//! into tokio through an unbounded channel; the manager's async pipeline
//! consumes from there. Writes are serialized by a `parking_lot` mutex so
//! concurrent senders cannot interleave bytes.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use maestro_core::MaestroError;
use parking_lot::Mutex;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// ETX — what the terminal driver turns into SIGINT for the foreground group.
const INTERRUPT_BYTE: u8 = 0x03;

/// A live subprocess attached to a pseudo-terminal.
pub struct PtySession {
    child: Mutex<Box<dyn Child + Send + Sync>>,
    writer: Mutex<Box<dyn Write + Send>>,
    output: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    /// Held so the controlling side of the PTY stays open for the session.
    _master: Mutex<Box<dyn MasterPty + Send>>,
}

impl PtySession {
    /// Spawn `command` on a fresh PTY with the given working directory and
    /// environment overlay.
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Self, MaestroError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 40,
                cols: 120,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| MaestroError::Internal(format!("openpty: {e}")))?;

        let mut builder = CommandBuilder::new(command);
        builder.args(args);
        if let Some(cwd) = cwd {
            builder.cwd(cwd);
        }
        for (key, value) in env {
            builder.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| MaestroError::Internal(format!("pty spawn: {e}")))?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| MaestroError::Internal(format!("pty reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| MaestroError::Internal(format!("pty writer: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        // Blocking reader thread; exits when the PTY closes or the receiver
        // is dropped.
        let _ = std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buf = [0_u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!("pty reader thread exiting");
            });

        Ok(Self {
            child: Mutex::new(child),
            writer: Mutex::new(writer),
            output: Mutex::new(Some(rx)),
            _master: Mutex::new(pair.master),
        })
    }

    /// Take the output channel (once, by the reader pipeline).
    pub fn take_output(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.output.lock().take()
    }

    /// Write text to the PTY. Serialized per session.
    pub fn write(&self, text: &str) -> Result<(), MaestroError> {
        let mut writer = self.writer.lock();
        writer
            .write_all(text.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| MaestroError::Internal(format!("pty write: {e}")))
    }

    /// Deliver an interrupt to the foreground process group.
    pub fn interrupt(&self) -> Result<(), MaestroError> {
        let mut writer = self.writer.lock();
        writer
            .write_all(&[INTERRUPT_BYTE])
            .and_then(|()| writer.flush())
            .map_err(|e| MaestroError::Internal(format!("pty interrupt: {e}")))
    }

    /// Terminate the subprocess.
    pub fn kill(&self) {
        if let Err(e) = self.child.lock().kill() {
            warn!(error = %e, "pty kill failed");
        }
    }

    /// Whether the subprocess is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self.child.lock().try_wait(), Ok(None))
    }

    /// Reap the subprocess if it has exited; returns its exit code.
    pub fn try_wait(&self) -> Option<u32> {
        self.child
            .lock()
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn read_until(
        rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
        needle: &str,
        timeout: Duration,
    ) -> String {
        let mut collected = String::new();
        let deadline = tokio::time::Instant::now() + timeout;
        while !collected.contains(needle) {
            let chunk = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("timed out waiting for pty output")
                .expect("pty closed");
            collected.push_str(&String::from_utf8_lossy(&chunk));
        }
        collected
    }

    #[tokio::test]
    async fn spawn_and_read_output() {
        let session = PtySession::spawn(
            "bash",
            &["-c".into(), "echo pty-hello".into()],
            None,
            &HashMap::new(),
        )
        .unwrap();
        let mut rx = session.take_output().unwrap();
        let output = read_until(&mut rx, "pty-hello", Duration::from_secs(5)).await;
        assert!(output.contains("pty-hello"));
    }

    #[tokio::test]
    async fn write_reaches_subprocess() {
        let session = PtySession::spawn(
            "bash",
            &["-c".into(), "read -r line; echo \"echoed:$line\"".into()],
            None,
            &HashMap::new(),
        )
        .unwrap();
        let mut rx = session.take_output().unwrap();
        session.write("ping\n").unwrap();
        let output = read_until(&mut rx, "echoed:ping", Duration::from_secs(5)).await;
        assert!(output.contains("echoed:ping"));
    }

    #[tokio::test]
    async fn env_overlay_visible() {
        let mut env = HashMap::new();
        let _ = env.insert("MAESTRO_TEST_VAR".to_owned(), "present".to_owned());
        let session = PtySession::spawn(
            "bash",
            &["-c".into(), "echo var=$MAESTRO_TEST_VAR".into()],
            None,
            &env,
        )
        .unwrap();
        let mut rx = session.take_output().unwrap();
        let output = read_until(&mut rx, "var=present", Duration::from_secs(5)).await;
        assert!(output.contains("var=present"));
    }

    #[tokio::test]
    async fn kill_terminates() {
        let session = PtySession::spawn(
            "bash",
            &["-c".into(), "sleep 30".into()],
            None,
            &HashMap::new(),
        )
        .unwrap();
        assert!(session.is_alive());
        session.kill();
        // Reap with a little patience.
        for _ in 0..50 {
            if !session.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn take_output_is_single_use() {
        let session = PtySession::spawn(
            "bash",
            &["-c".into(), "true".into()],
            None,
            &HashMap::new(),
        )
        .unwrap();
        assert!(session.take_output().is_some());
        assert!(session.take_output().is_none());
    }
}
