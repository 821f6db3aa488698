//! Supervised collector process
//!
//! Spawns the collector and streams each line it writes to stdout or stderr
//! into the watcher channel.

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use crate::error::Result;
use crate::logs::event::{LogEvent, LogEventSender};

/// Target attached to lines read from the child's stdout
pub const STDOUT_TARGET: &str = "collector";

/// Target attached to lines read from the child's stderr
pub const STDERR_TARGET: &str = "collector::stderr";

/// A running collector process
pub struct ChildCollector {
    child: Child,
}

impl ChildCollector {
    /// Start `program` with `args`, forwarding its output to `events`
    pub fn spawn(program: &str, args: &[String], events: LogEventSender) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, events.clone(), STDOUT_TARGET, "INFO"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, events, STDERR_TARGET, "WARN"));
        }

        tracing::info!(program, pid = ?child.id(), "Started collector process");
        Ok(Self { child })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    pub async fn kill(&mut self) -> Result<()> {
        Ok(self.child.kill().await?)
    }
}

/// Forward each line of `reader` until EOF; bytes that are not UTF-8 are
/// replaced rather than ending the stream
async fn forward_lines<R>(
    reader: R,
    events: LogEventSender,
    target: &'static str,
    level: &'static str,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(&['\n', '\r'][..]);
                let event = LogEvent::new(line).with_level(level).with_target(target);
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(stream = target, "Failed to read collector output: {}", e);
                break;
            }
        }
    }
}
