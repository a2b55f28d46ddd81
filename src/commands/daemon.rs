//! Daemon lifecycle
//!
//! `start`, `stop` and `restart` hold the process-level daemon lock for
//! their whole duration. A foreground start runs the configured daemon
//! executable in this process and takes no lock.

use anyhow::{Context as _, Result, bail};
use indicatif::ProgressBar;
use std::time::Duration;

use crate::Context;
use crate::cli::DaemonCommand;
use crate::cluster::{Connector, HttpConnector};
use crate::lock;
use crate::paths::Paths;
use crate::progress;
use crate::runner;
use crate::ui;
use daemonapi::DaemonApi;
use daemonapi::poll::{PollCallback, PollConfig, poll_until};

pub fn run(ctx: &Context, cmd: DaemonCommand) -> Result<i32> {
    let conn = HttpConnector::new(ctx.config.clone());
    let Some(api) = conn.local_daemon() else {
        bail!("no daemon configured: set [daemon] url in {}", ctx.paths.node_config().display());
    };
    let control = DaemonControl::new(api, &ctx.paths, ctx.config.lock_timeout())
        .with_exec(ctx.config.daemon.exec.clone())
        .with_progress(ctx.interactive());

    match cmd {
        DaemonCommand::Start { foreground: true } => control.run_foreground(),
        DaemonCommand::Start { foreground: false } => control.start(&SelfLauncher),
        DaemonCommand::Stop => control.stop(),
        DaemonCommand::Restart { foreground } => control.restart(&SelfLauncher, foreground),
        DaemonCommand::Running => {
            let running = control.running();
            if !ctx.quiet {
                println!("{running}");
            }
            return Ok(i32::from(!running));
        }
    }?;
    Ok(0)
}

/// Starts a background daemon process
pub trait Launcher {
    fn launch(&self) -> Result<()>;
}

/// Re-executes this binary as `daemon start --foreground`
pub struct SelfLauncher;

impl Launcher for SelfLauncher {
    fn launch(&self) -> Result<()> {
        let exe = std::env::current_exe().context("Could not locate the om executable")?;
        let exe = exe.to_string_lossy();
        let pid = runner::spawn_detached(&exe, &["daemon", "start", "--foreground"])?;
        log::info!("daemon spawned, pid {pid}");
        Ok(())
    }
}

struct SpinnerCallback<'a>(&'a ProgressBar);

impl PollCallback for SpinnerCallback<'_> {
    fn on_wait(&self, attempt: u32, max_attempts: u32) {
        self.0.set_message(format!("waiting for the daemon ({attempt}/{max_attempts})"));
    }
}

pub struct DaemonControl<'a> {
    api: &'a dyn DaemonApi,
    paths: &'a Paths,
    lock_timeout: Duration,
    exec: Option<String>,
    poll: PollConfig,
    show_progress: bool,
}

impl<'a> DaemonControl<'a> {
    pub fn new(api: &'a dyn DaemonApi, paths: &'a Paths, lock_timeout: Duration) -> Self {
        Self {
            api,
            paths,
            lock_timeout,
            exec: None,
            poll: PollConfig::default(),
            show_progress: false,
        }
    }

    #[must_use]
    pub fn with_exec(mut self, exec: Option<String>) -> Self {
        self.exec = exec;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Whether the daemon answers
    pub fn running(&self) -> bool {
        match self.api.ping() {
            Ok(()) => true,
            Err(e) => {
                log::debug!("daemon not running: {e}");
                false
            }
        }
    }

    pub fn start(&self, launcher: &dyn Launcher) -> Result<()> {
        let _guard = lock::acquire(&self.paths.daemon_lock(), self.lock_timeout, "daemon start")?;
        self.start_locked(launcher)
    }

    pub fn stop(&self) -> Result<()> {
        let _guard = lock::acquire(&self.paths.daemon_lock(), self.lock_timeout, "daemon stop")?;
        self.stop_locked()
    }

    /// Stop, then start in the background or in this process
    pub fn restart(&self, launcher: &dyn Launcher, foreground: bool) -> Result<()> {
        {
            let _guard =
                lock::acquire(&self.paths.daemon_lock(), self.lock_timeout, "daemon restart")?;
            self.stop_locked()?;
            if !foreground {
                return self.start_locked(launcher);
            }
        }
        self.run_foreground()
    }

    /// Stop the daemon, run `install`, then start it again, holding the
    /// daemon lock throughout
    ///
    /// A failed `install` leaves the daemon stopped.
    pub fn reinstall(
        &self,
        launcher: &dyn Launcher,
        intent: &str,
        install: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let _guard = lock::acquire(&self.paths.daemon_lock(), self.lock_timeout, intent)?;
        self.stop_locked()?;
        install()?;
        self.start_locked(launcher)
    }

    /// Run the daemon executable until it exits
    pub fn run_foreground(&self) -> Result<()> {
        let Some(exec) = self.exec.as_deref() else {
            bail!("no daemon executable configured: set [daemon] exec");
        };
        log::info!("running daemon in the foreground: {exec}");
        let status = runner::run_interactive(exec, None, &[])?;
        if !status.success() {
            bail!("daemon exited with {status}");
        }
        Ok(())
    }

    fn start_locked(&self, launcher: &dyn Launcher) -> Result<()> {
        if self.running() {
            ui::info(&format!("daemon already running at {}", self.api.endpoint()));
            return Ok(());
        }
        launcher.launch()?;
        if !self.wait_until(true) {
            bail!(
                "daemon did not report running within {:?}",
                self.poll.budget()
            );
        }
        ui::success("daemon started");
        Ok(())
    }

    fn stop_locked(&self) -> Result<()> {
        if !self.running() {
            log::info!("daemon not running");
            return Ok(());
        }
        self.api.post_daemon_stop()?;
        if !self.wait_until(false) {
            bail!("daemon still running after {:?}", self.poll.budget());
        }
        ui::success("daemon stopped");
        Ok(())
    }

    fn wait_until(&self, running: bool) -> bool {
        let pb = if self.show_progress {
            progress::spinner("waiting for the daemon")
        } else {
            progress::hidden()
        };
        let callback = SpinnerCallback(&pb);
        let reached = poll_until(&self.poll, Some(&callback), || self.running() == running);
        progress::finish_clear(&pb);
        reached
    }
}
