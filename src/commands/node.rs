use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::Context;
use crate::actions;
use crate::checks::{self, CheckReport};
use crate::cli::{NodeActionArgs, NodeCommand};
use crate::cluster::{Connector, HttpConnector};
use crate::commands::daemon::{DaemonControl, Launcher, SelfLauncher};
use crate::config::ClusterSection;
use crate::paths::Paths;
use crate::request::ActionRequest;
use crate::ui::{self, Format};
use daemonapi::watch::{NODE_LABEL, PATH_LABEL};
use daemonapi::{DaemonApi, EventFilter, Expectation, HttpDaemon, Watcher};

pub fn run(ctx: &Context, cmd: NodeCommand) -> Result<i32> {
    let conn = HttpConnector::new(ctx.config.clone());
    match cmd {
        NodeCommand::Freeze(args) => action(ctx, &conn, "freeze", args),
        NodeCommand::Unfreeze(args) => action(ctx, &conn, "unfreeze", args),
        NodeCommand::Drain(args) => action(ctx, &conn, "drain", args),
        NodeCommand::Checks { jobs } => run_checks(ctx, conn.nodename(), jobs),
        NodeCommand::Join { server, token } => {
            let local = local_daemon(ctx, &conn)?;
            let control = DaemonControl::new(local, &ctx.paths, ctx.config.lock_timeout())
                .with_progress(ctx.interactive());
            join(&ctx.paths, &control, &HttpDaemon::new(server), &token, &SelfLauncher)?;
            Ok(0)
        }
        NodeCommand::Leave { time } => {
            leave(&ctx.paths, local_daemon(ctx, &conn)?, conn.nodename(), time)?;
            ui::success(&format!("node {} left the cluster", conn.nodename()));
            Ok(0)
        }
        NodeCommand::Events { kind, path, time } => {
            events(ctx, local_daemon(ctx, &conn)?, &kind, path.as_deref(), time)
        }
    }
}

fn local_daemon<'a>(ctx: &Context, conn: &'a HttpConnector) -> Result<&'a dyn DaemonApi> {
    conn.local_daemon().with_context(|| {
        format!(
            "no daemon configured: set [daemon] url in {}",
            ctx.paths.node_config().display()
        )
    })
}

fn action(ctx: &Context, conn: &dyn Connector, name: &str, args: NodeActionArgs) -> Result<i32> {
    let spec = actions::node_action(name).with_context(|| format!("unknown node action: {name}"))?;
    let params = args.flags.into_params(args.nodes);
    let req = ActionRequest::new(spec, params, conn.nodename(), ctx.config.has_daemon())?;
    super::execute(ctx, conn, &req)
}

// ============================================================================
// Checks
// ============================================================================

fn run_checks(ctx: &Context, nodename: &str, jobs: usize) -> Result<i32> {
    if ctx.config.checks.is_empty() {
        ui::info("no check drivers configured");
        return Ok(0);
    }
    let env = vec![("OM_NODENAME".to_string(), nodename.to_string())];
    let reports = checks::run_all(&ctx.config.checks, jobs, &env)?;
    match ctx.format {
        Format::Json => ui::json(&reports)?,
        Format::Human => print_checks(&reports),
    }
    Ok(i32::from(!reports.iter().all(CheckReport::is_ok)))
}

fn print_checks(reports: &[CheckReport]) {
    for report in reports {
        ui::header(&report.name);
        if let Some(err) = &report.error {
            ui::error(err);
            continue;
        }
        if report.values.is_empty() {
            ui::dim("no values");
        }
        for v in &report.values {
            let instance = if v.instance.is_empty() { "-" } else { v.instance.as_str() };
            let value = match &v.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            ui::kv(instance, &format!("{}{}", value.bold(), v.unit));
        }
    }
}

// ============================================================================
// Join / Leave
// ============================================================================

/// Join a cluster through `server`
///
/// The local daemon is stopped first and started again once the cluster
/// files are installed, all under the daemon lock. A bundle that does not
/// validate installs nothing.
pub fn join(
    paths: &Paths,
    control: &DaemonControl<'_>,
    server: &dyn DaemonApi,
    token: &str,
    launcher: &dyn Launcher,
) -> Result<()> {
    fs::create_dir_all(paths.config_dir())
        .with_context(|| format!("Could not create {}", paths.config_dir().display()))?;
    // removed on drop unless installed
    let mut ca = NamedTempFile::new_in(paths.config_dir()).context("Could not create a temporary CA file")?;

    control.reinstall(launcher, "node join", || {
        log::info!("fetching join bundle from {}", server.endpoint());
        let bundle = server
            .fetch_join_bundle(token)
            .with_context(|| format!("Could not join through {}", server.endpoint()))?;
        validate_pem(&bundle.ca_pem)?;
        let cluster = ClusterSection::parse_overlay(&bundle.cluster_toml).context("Invalid cluster configuration in the join bundle")?;

        ca.write_all(bundle.ca_pem.as_bytes())
            .context("Could not write the cluster CA")?;
        write_atomic(&paths.cluster_config(), &bundle.cluster_toml)?;
        ca.persist(paths.ca_file())
            .with_context(|| format!("Could not install {}", paths.ca_file().display()))?;
        log::info!(
            "joined cluster {} ({} nodes)",
            cluster.name.as_deref().unwrap_or("-"),
            cluster.nodes.len()
        );
        Ok(())
    })
}

fn validate_pem(pem: &str) -> Result<()> {
    let begin = pem.find("-----BEGIN CERTIFICATE-----");
    let end = pem.find("-----END CERTIFICATE-----");
    match (begin, end) {
        (Some(b), Some(e)) if b < e => Ok(()),
        _ => bail!("the join bundle carries no PEM certificate"),
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path)
        .with_context(|| format!("Could not install {}", path.display()))?;
    Ok(())
}

/// Ask the cluster to release this node and wait for its answer
///
/// On success the local cluster overlay is removed.
pub fn leave(paths: &Paths, api: &dyn DaemonApi, nodename: &str, time: Duration) -> Result<()> {
    let expect = Expectation::leave();
    let filter = expect.filter().label(NODE_LABEL, nodename);
    let watcher = Watcher::start(api.events(&filter)?);

    api.post_node_leave()?;
    let settled = watcher.wait(&expect, NODE_LABEL, &[nodename.to_string()], time)?;
    let Some(outcome) = settled.first() else {
        bail!("leave: no answer from the cluster");
    };
    if !outcome.outcome.is_success() {
        bail!("leave refused: {}", outcome.reason());
    }
    log::info!("{nodename}: {}", outcome.event.kind);

    let overlay = paths.cluster_config();
    if overlay.exists() {
        fs::remove_file(&overlay).with_context(|| format!("Could not remove {}", overlay.display()))?;
    }
    Ok(())
}

// ============================================================================
// Events
// ============================================================================

fn events(
    ctx: &Context,
    api: &dyn DaemonApi,
    kinds: &[String],
    path: Option<&str>,
    time: Duration,
) -> Result<i32> {
    let mut filter = kinds
        .iter()
        .fold(EventFilter::new(), |f, k| f.kind(k.clone()));
    if let Some(path) = path {
        filter = filter.label(PATH_LABEL, path);
    }
    let watcher = Watcher::start(api.events(&filter)?);
    let format = ctx.format;
    let seen = watcher.follow(time, |event| {
        let label = if event.label_value(PATH_LABEL).is_some() {
            PATH_LABEL
        } else {
            NODE_LABEL
        };
        ui::event(event, label, format);
    })?;
    log::debug!("{seen} event(s)");
    Ok(0)
}
