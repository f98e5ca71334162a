//! Operator console: `!!` lines are backup commands, the rest goes to the server.

use crate::commands;
use crate::state::RunnerState;
use perma_backup::Requester;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Stdin lines, read on a plain thread that never blocks runtime shutdown
fn read_stdin() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub fn start(state: Arc<RunnerState>, cancel: CancellationToken) {
    tokio::spawn(run_console(read_stdin(), state, cancel));
}

pub async fn run_console(
    mut lines: mpsc::UnboundedReceiver<String>,
    state: Arc<RunnerState>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("!!") {
            if !commands::dispatch(&state, Requester::Console, line).await {
                println!("Unknown command: {line}");
            }
            continue;
        }
        if let Err(e) = state.host.execute(line) {
            warn!("Could not forward `{}` to the server: {}", line, e);
        }
    }
    debug!("Console stopped");
}
