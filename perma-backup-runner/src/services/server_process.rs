//! The supervised game server process.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct ServerProcess {
    child: Child,
    stdin_tx: mpsc::UnboundedSender<String>,
}

/// Start `command` in `cwd` with all three standard streams piped.
///
/// Returns the process and a channel carrying every stdout and stderr line.
pub fn spawn(
    command: &[String],
    cwd: &Path,
) -> io::Result<(ServerProcess, mpsc::UnboundedReceiver<String>)> {
    let mut argv = command.iter();
    let program = argv
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty server command"))?;

    let mut cmd = Command::new(program);
    cmd.args(argv);
    cmd.current_dir(cwd);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn()?;
    info!(pid = ?child.id(), "Started server: {}", command.join(" "));

    let (line_tx, line_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, line_tx);
    }

    let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
    if let Some(stdin) = child.stdin.take() {
        tokio::spawn(write_stdin(stdin, stdin_rx));
    }

    Ok((ServerProcess { child, stdin_tx }, line_rx))
}

fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

async fn write_stdin(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = written.await {
            warn!("Server stdin closed: {}", e);
            break;
        }
    }
    debug!("Stdin writer stopped");
}

impl ServerProcess {
    /// Sender feeding the server's stdin, one command per line
    pub fn stdin(&self) -> mpsc::UnboundedSender<String> {
        self.stdin_tx.clone()
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Send `stop_command` and give the server `timeout` to exit before killing it
    pub async fn stop(&mut self, stop_command: &str, timeout: Duration) -> io::Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Server already exited with {}", status);
            return Ok(());
        }

        if self.stdin_tx.send(stop_command.to_string()).is_err() {
            warn!("Server stdin is closed, cannot send `{}`", stop_command);
        }

        info!("Waiting up to {}s for the server to stop", timeout.as_secs());
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                info!("Server exited with {}", status?);
                Ok(())
            }
            Err(_) => {
                warn!("Server did not stop in time, killing it");
                self.child.kill().await
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_output_lines_are_forwarded() {
        let cwd = std::env::temp_dir();
        let (mut server, mut lines) = spawn(&sh("echo out; echo err 1>&2"), &cwd).unwrap();

        let mut received = Vec::new();
        while let Some(line) = lines.recv().await {
            received.push(line);
        }
        received.sort();

        assert_eq!(received, vec!["err", "out"]);
        assert!(server.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_stop_command_goes_to_stdin() {
        let cwd = std::env::temp_dir();
        let script = r#"while read line; do echo "got $line"; [ "$line" = stop ] && exit 0; done"#;
        let (mut server, mut lines) = spawn(&sh(script), &cwd).unwrap();

        server.stdin().send("save-off".to_string()).unwrap();
        assert_eq!(lines.recv().await.unwrap(), "got save-off");

        server.stop("stop", Duration::from_secs(5)).await.unwrap();
        assert_eq!(lines.recv().await.unwrap(), "got stop");
    }

    #[tokio::test]
    async fn test_unresponsive_server_is_killed() {
        let cwd = std::env::temp_dir();
        let (mut server, _lines) = spawn(&sh("sleep 30"), &cwd).unwrap();

        server.stop("stop", Duration::from_millis(50)).await.unwrap();

        assert!(!server.wait().await.unwrap().success());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let err = spawn(&[], Path::new(".")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
