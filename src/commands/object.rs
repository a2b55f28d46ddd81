use anyhow::{Context as _, Result, bail};
use std::time::Duration;

use crate::Context;
use crate::actions;
use crate::cli::{ObjectArgs, ObjectVerb};
use crate::cluster::{Connector, HttpConnector};
use crate::inventory::DaemonInventory;
use crate::orchestrator;
use crate::request::{ActionRequest, DEFAULT_WAIT, RequestParams};
use crate::selector::Selector;
use crate::ui;
use daemonapi::watch::PATH_LABEL;

pub fn run(ctx: &Context, args: ObjectArgs) -> Result<i32> {
    let conn = HttpConnector::new(ctx.config.clone());
    let ObjectArgs {
        selector,
        flags,
        verb,
    } = args;

    if matches!(verb, ObjectVerb::Monitor) {
        return monitor(ctx, &conn, &selector, flags.time.unwrap_or(DEFAULT_WAIT));
    }

    let name = verb.name();
    let mut params = flags.into_params(Some(selector));
    apply_verb_args(&mut params, verb);

    let spec = actions::object_action(name).with_context(|| format!("unknown object action: {name}"))?;
    let req = ActionRequest::new(spec, params, conn.nodename(), ctx.config.has_daemon())?;
    super::execute(ctx, &conn, &req)
}

fn apply_verb_args(params: &mut RequestParams, verb: ObjectVerb) {
    match verb {
        ObjectVerb::Create { from } => params.from = from,
        ObjectVerb::Get(k) | ObjectVerb::Eval(k) | ObjectVerb::Set(k) | ObjectVerb::Unset(k) => {
            params.keywords = k.kw;
        }
        ObjectVerb::Switch { destination } => params.destination = Some(destination),
        _ => {}
    }
}

/// Print the selected objects' events until `time` passes
fn monitor(ctx: &Context, conn: &dyn Connector, selector: &str, time: Duration) -> Result<i32> {
    let Some(daemon) = conn.local_daemon().filter(|_| conn.has_cluster_context()) else {
        bail!("monitor needs a cluster daemon");
    };
    let units: Vec<String> = Selector::parse(selector)?
        .resolve(&DaemonInventory::new(daemon))?
        .iter()
        .map(|p| p.fqn())
        .collect();
    if units.is_empty() {
        bail!("no object matched '{selector}'");
    }
    if ctx.format == ui::Format::Human && !ctx.quiet {
        ui::info(&format!("monitoring {} object(s) for {time:?}", units.len()));
    }

    let format = ctx.format;
    let handle = orchestrator::spawn_watch(daemon, PATH_LABEL, units, time, move |event| {
        ui::event(event, PATH_LABEL, format);
    })?;
    match handle.join() {
        Ok(seen) => {
            log::debug!("monitor: {seen} event(s)");
            Ok(0)
        }
        Err(_) => bail!("event watch ended abnormally"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::KeywordArgs;
    use std::path::PathBuf;

    #[test]
    fn test_verb_arguments_reach_params() {
        let mut params = RequestParams::default();
        apply_verb_args(
            &mut params,
            ObjectVerb::Set(KeywordArgs {
                kw: vec!["app#1.start=true".into()],
            }),
        );
        assert_eq!(params.keywords, ["app#1.start=true"]);

        apply_verb_args(&mut params, ObjectVerb::Switch { destination: "n2".into() });
        assert_eq!(params.destination.as_deref(), Some("n2"));

        apply_verb_args(
            &mut params,
            ObjectVerb::Create {
                from: Some(PathBuf::from("/tmp/tpl.toml")),
            },
        );
        assert_eq!(params.from, Some(PathBuf::from("/tmp/tpl.toml")));
    }

    #[test]
    fn test_every_verb_has_an_action() {
        for verb in [
            ObjectVerb::Delete,
            ObjectVerb::Purge,
            ObjectVerb::Start,
            ObjectVerb::Stop,
            ObjectVerb::Restart,
            ObjectVerb::Freeze,
            ObjectVerb::Unfreeze,
            ObjectVerb::Provision,
            ObjectVerb::Unprovision,
            ObjectVerb::Takeover,
            ObjectVerb::Giveback,
            ObjectVerb::Abort,
            ObjectVerb::Run,
            ObjectVerb::SyncUpdate,
            ObjectVerb::SyncResync,
            ObjectVerb::SyncFull,
            ObjectVerb::Prstart,
            ObjectVerb::Prstop,
            ObjectVerb::Status,
            ObjectVerb::Logs,
            ObjectVerb::Enter,
        ] {
            assert!(actions::object_action(verb.name()).is_some(), "{}", verb.name());
        }
    }
}
