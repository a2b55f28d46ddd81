// Routed actions
pub mod node;
pub mod object;

// Daemon lifecycle
pub mod daemon;

use anyhow::Result;
use serde_json::Value;

use crate::Context;
use crate::actions::LocalOp;
use crate::cluster::Connector;
use crate::request::ActionRequest;
use crate::results::{self, ActionResult, BatchError};
use crate::router::Router;
use crate::ui::{self, Format};

/// Route a request, print its results and return the exit code
pub fn execute(ctx: &Context, conn: &dyn Connector, req: &ActionRequest) -> Result<i32> {
    let router = Router::new(conn, &ctx.paths, ctx.config.lock_timeout())
        .with_progress(ctx.interactive())
        .with_format(ctx.format);
    let dispatch = router.dispatch(req)?;
    let silent = req.action().silent;
    ui::render(&dispatch.results, ctx.format, silent)?;

    if let Some(handle) = dispatch.watch
        && handle.join().is_err()
    {
        log::warn!("event watch ended abnormally");
    }

    if !silent
        && ctx.format == Format::Human
        && dispatch.results.len() > 1
        && let Some(err) = BatchError::from_results(&dispatch.results)
    {
        ui::error(&err.to_string());
    }

    if req.action().local == Some(LocalOp::Status) {
        return Ok(status_exit_code(&dispatch.results));
    }
    Ok(results::exit_code(&dispatch.results))
}

/// 0 when every object is up or has nothing to report
fn status_exit_code(results: &[ActionResult]) -> i32 {
    let healthy = results.iter().all(|r| {
        r.is_ok()
            && matches!(
                r.data.get("avail").and_then(Value::as_str),
                Some("up" | "n/a")
            )
    });
    i32::from(!healthy)
}
