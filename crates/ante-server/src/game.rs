//! The external game process: start, stop, status.
//!
//! One process at most. Its stdout and stderr are forwarded line by line to
//! the log with `GAME-OUT` / `GAME-ERR` prefixes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use ante_core::config::GameConfig;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const STOP_GRACE: Duration = Duration::from_secs(5);

/// How the game should begin.
#[derive(Debug, Clone, PartialEq)]
pub enum Launch {
    /// A new run, optionally pinned to a seed (`SEED=...`).
    NewRun { seed: Option<String> },
    /// Resume from the save file already restored on disk (`CONTINUE=true`).
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    Killed,
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GameStatus {
    NotStarted,
    Running { pid: u32 },
    Exited { code: Option<i32> },
}

struct Running {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

pub struct GameController {
    command: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    proc: Mutex<Option<Running>>,
}

impl GameController {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            cwd: config.cwd.clone(),
            proc: Mutex::new(None),
        }
    }

    /// Start the game, stopping any process already running. Returns the pid.
    pub async fn start(&self, launch: Launch) -> anyhow::Result<u32> {
        let mut guard = self.proc.lock().await;
        if let Some(prev) = guard.take() {
            let outcome = shutdown(prev).await;
            info!(?outcome, "previous game process stopped");
        }

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        match &launch {
            Launch::NewRun { seed: Some(seed) } => {
                cmd.env("SEED", seed);
            }
            Launch::NewRun { seed: None } => {}
            Launch::Continue => {
                cmd.env("CONTINUE", "true");
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn '{}': {e}", self.command))?;
        let pid = child.id().unwrap_or_default();

        let mut forwarders = Vec::new();
        if let Some(out) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(out, "GAME-OUT")));
        }
        if let Some(err) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(err, "GAME-ERR")));
        }

        info!(pid, ?launch, "game started");
        *guard = Some(Running { child, forwarders });
        Ok(pid)
    }

    /// Terminate the game: polite signal first, then kill after the grace period.
    pub async fn stop(&self) -> StopOutcome {
        let Some(running) = self.proc.lock().await.take() else {
            return StopOutcome::NotRunning;
        };
        let outcome = shutdown(running).await;
        info!(?outcome, "game process stopped");
        outcome
    }

    pub async fn status(&self) -> GameStatus {
        let mut guard = self.proc.lock().await;
        let Some(running) = guard.as_mut() else {
            return GameStatus::NotStarted;
        };
        match running.child.try_wait() {
            Ok(None) => GameStatus::Running {
                pid: running.child.id().unwrap_or_default(),
            },
            Ok(Some(status)) => GameStatus::Exited {
                code: status.code(),
            },
            Err(e) => {
                warn!(error = %e, "could not poll game process");
                GameStatus::Exited { code: None }
            }
        }
    }
}

async fn forward_lines<R>(reader: R, prefix: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!("[{prefix}] {line}");
    }
}

async fn shutdown(mut running: Running) -> StopOutcome {
    if !matches!(running.child.try_wait(), Ok(None)) {
        abort_forwarders(&running);
        return StopOutcome::NotRunning;
    }
    terminate(&running.child);
    let outcome = match tokio::time::timeout(STOP_GRACE, running.child.wait()).await {
        Ok(_) => StopOutcome::Stopped,
        Err(_) => {
            if let Err(e) = running.child.kill().await {
                warn!(error = %e, "failed to kill game process");
            }
            StopOutcome::Killed
        }
    };
    abort_forwarders(&running);
    outcome
}

fn abort_forwarders(running: &Running) {
    for task in &running.forwarders {
        task.abort();
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SIGTERM lets the game flush its save before exiting.
        let _ = std::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status();
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(command: &str, args: &[&str]) -> GameController {
        GameController::new(&GameConfig {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..GameConfig::default()
        })
    }

    #[tokio::test]
    async fn status_before_start_is_not_started() {
        let game = controller("sleep", &["30"]);
        assert_eq!(game.status().await, GameStatus::NotStarted);
        assert_eq!(game.stop().await, StopOutcome::NotRunning);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_then_stop_running_process() {
        let game = controller("sleep", &["30"]);
        let pid = game.start(Launch::NewRun { seed: None }).await.unwrap();
        assert!(pid > 0);
        assert!(matches!(game.status().await, GameStatus::Running { .. }));
        assert_eq!(game.stop().await, StopOutcome::Stopped);
        assert_eq!(game.status().await, GameStatus::NotStarted);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_process_reports_code() {
        let game = controller("sh", &["-c", "exit 3"]);
        game.start(Launch::Continue).await.unwrap();
        let mut status = game.status().await;
        for _ in 0..50 {
            if matches!(status, GameStatus::Exited { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = game.status().await;
        }
        assert_eq!(status, GameStatus::Exited { code: Some(3) });
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let game = controller("ante-definitely-not-a-real-binary", &[]);
        assert!(game.start(Launch::NewRun { seed: None }).await.is_err());
    }
}
