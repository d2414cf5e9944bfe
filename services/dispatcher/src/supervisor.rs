use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::task::JoinSet;

/// Delay before retrying a worker that failed to start or died young.
const LAUNCH_RETRY_DELAY: Duration = Duration::from_secs(1);
/// A worker that exits sooner than this after launch is restarted only
/// after the retry delay.
const MIN_UPTIME: Duration = Duration::from_secs(5);

/// Starts one worker process.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self) -> io::Result<Child>;
}

/// Re-executes the current binary in worker mode.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn current(environment: &str) -> io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec![
                "--environment".to_owned(),
                environment.to_owned(),
                "worker".to_owned(),
            ],
        })
    }
}

impl Launcher for WorkerCommand {
    fn launch(&self) -> io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .spawn()
    }
}

struct WorkerExit {
    slot: usize,
    pid: Option<u32>,
    status: io::Result<ExitStatus>,
}

/// Keeps a fixed number of worker processes alive.
///
/// Whenever a worker exits, for whatever reason, a replacement is started in
/// its slot. Workers that crash right after launch are replaced at most once
/// per retry delay.
pub struct WorkerPool<L: Launcher> {
    launcher: L,
    size: usize,
    retry_delay: Duration,
    min_uptime: Duration,
}

impl<L: Launcher> WorkerPool<L> {
    pub fn new(launcher: L, size: usize) -> Self {
        Self {
            launcher,
            size: size.max(1),
            retry_delay: LAUNCH_RETRY_DELAY,
            min_uptime: MIN_UPTIME,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_min_uptime(mut self, uptime: Duration) -> Self {
        self.min_uptime = uptime;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Supervise forever.
    pub async fn run(&self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Supervise until `shutdown` resolves, then kill the pool. Returns the
    /// number of replacements started.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> usize {
        let mut workers = JoinSet::new();
        for slot in 0..self.size {
            self.start(&mut workers, slot);
        }
        tracing::info!(workers = self.size, "worker pool started");

        tokio::pin!(shutdown);
        let mut restarts = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(restarts, "worker pool stopping");
                    workers.shutdown().await;
                    return restarts;
                }
                Some(joined) = workers.join_next() => {
                    let exit = match joined {
                        Ok(exit) => exit,
                        Err(e) => {
                            tracing::error!(error = %e, "worker watcher task failed");
                            continue;
                        }
                    };
                    match &exit.status {
                        Ok(status) => tracing::warn!(
                            pid = exit.pid,
                            slot = exit.slot,
                            status = %status,
                            "worker {} died",
                            exit.pid.unwrap_or_default()
                        ),
                        Err(e) => tracing::error!(
                            pid = exit.pid,
                            slot = exit.slot,
                            error = %e,
                            "worker failed"
                        ),
                    }
                    restarts += 1;
                    self.start(&mut workers, exit.slot);
                }
            }
        }
    }

    fn start(&self, workers: &mut JoinSet<WorkerExit>, slot: usize) {
        match self.launcher.launch() {
            Ok(mut child) => {
                let pid = child.id();
                tracing::info!(pid, slot, "worker {} born", pid.unwrap_or_default());
                let (delay, min_uptime) = (self.retry_delay, self.min_uptime);
                workers.spawn(async move {
                    let born = Instant::now();
                    let status = child.wait().await;
                    if born.elapsed() < min_uptime {
                        tracing::warn!(pid, slot, ?delay, "worker exited early, delaying restart");
                        tokio::time::sleep(delay).await;
                    }
                    WorkerExit { slot, pid, status }
                });
            }
            Err(e) => {
                let delay = self.retry_delay;
                workers.spawn(async move {
                    tokio::time::sleep(delay).await;
                    WorkerExit {
                        slot,
                        pid: None,
                        status: Err(e),
                    }
                });
            }
        }
    }
}
