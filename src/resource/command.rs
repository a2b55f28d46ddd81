//! Command driver - resource actions as shell commands
//!
//! Every resource section is served by this driver. A per-verb keyword
//! holds the command:
//!
//! - absent or empty: the step is skipped
//! - true-like (`true`, `yes`, `1`, `on`): run `<script> <verb>`; a missing
//!   `script` keyword is a configuration error
//! - anything else: run with `sh -c`
//!
//! `seq` must be an integer when set.

use anyhow::{Context, Result, bail};
use std::process::ExitStatus;

use crate::runner;
use crm::{ActionContext, ActionOutcome, Availability, Resource, Verb};

/// Keyword list in declaration order
pub type Keywords = Vec<(String, String)>;

/// What a verb keyword resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `<script> <verb>`
    Script { script: String, verb: String },
    /// `sh -c <line>`
    Shell(String),
}

impl Command {
    fn run_capture(&self, env: &[(String, String)]) -> Result<String> {
        match self {
            Self::Script { script, verb } => runner::run_capture(script, Some(&[verb.as_str()]), env),
            Self::Shell(line) => runner::run_capture(line, None, env),
        }
    }

    fn run_interactive(&self, env: &[(String, String)]) -> Result<ExitStatus> {
        match self {
            Self::Script { script, verb } => runner::run_interactive(script, Some(&[verb.as_str()]), env),
            Self::Shell(line) => runner::run_interactive(line, None, env),
        }
    }

    fn probe(&self, env: &[(String, String)]) -> bool {
        match self {
            Self::Script { script, verb } => runner::run_quiet(script, Some(&[verb.as_str()]), env),
            Self::Shell(line) => runner::run_quiet(line, None, env),
        }
    }
}

/// A resource driven by per-verb commands
#[derive(Debug, Clone)]
pub struct CommandResource {
    rid: String,
    keywords: Keywords,
    tags: Vec<String>,
    seq: Option<i64>,
}

impl CommandResource {
    pub fn new(rid: impl Into<String>, keywords: Keywords) -> Result<Self> {
        let rid = rid.into();
        let value = |name: &str| {
            keywords
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.trim())
        };
        let tags = value("tags")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let seq = value("seq")
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse::<i64>()
                    .with_context(|| format!("{rid}: seq is set to '{v}', not an integer"))
            })
            .transpose()?;
        Ok(Self {
            rid,
            keywords,
            tags,
            seq,
        })
    }

    pub fn keyword(&self, name: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn flag(&self, name: &str) -> bool {
        self.keyword(name).is_some_and(is_true_like)
    }

    /// Resolve a verb keyword to a command, `None` when the step is a no-op
    pub fn command(&self, verb: &str) -> Result<Option<Command>> {
        let Some(value) = self.keyword(verb).map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        if !is_true_like(value) {
            return Ok(Some(Command::Shell(value.to_string())));
        }
        match self.keyword("script").filter(|s| !s.trim().is_empty()) {
            Some(script) => Ok(Some(Command::Script {
                script: script.trim().to_string(),
                verb: verb.to_string(),
            })),
            None => bail!("{verb} is set to '{value}' but no script is declared"),
        }
    }

    fn env(&self, ctx: &ActionContext) -> Vec<(String, String)> {
        let mut env = ctx.env.clone();
        env.push(("OM_RID".to_string(), self.rid.clone()));
        env
    }

    /// Run the `enter` command with the terminal attached
    pub fn enter(&self, ctx: &ActionContext) -> Result<ExitStatus> {
        match self.command("enter")? {
            Some(cmd) => cmd.run_interactive(&self.env(ctx)),
            None => bail!("{}: no enter command declared", self.rid),
        }
    }
}

impl Resource for CommandResource {
    fn rid(&self) -> &str {
        &self.rid
    }

    fn description(&self) -> String {
        match self.keyword("type") {
            Some(kind) => format!("{} ({kind})", self.rid),
            None => self.rid.clone(),
        }
    }

    fn seq(&self) -> Option<i64> {
        self.seq
    }

    fn subset(&self) -> Option<&str> {
        self.keyword("subset").filter(|s| !s.is_empty())
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.keyword(name).map(str::to_string)
    }

    fn is_optional(&self) -> bool {
        self.flag("optional")
    }

    fn is_disabled(&self) -> bool {
        self.flag("disable")
    }

    fn status(&self, ctx: &ActionContext) -> Result<Availability> {
        let Some(cmd) = self.command("status")? else {
            return Ok(Availability::NotApplicable);
        };
        if cmd.probe(&self.env(ctx)) {
            Ok(Availability::Up)
        } else {
            Ok(Availability::Down)
        }
    }

    fn action(&self, verb: Verb, ctx: &mut ActionContext) -> Result<ActionOutcome> {
        let Some(cmd) = self.command(verb.as_str())? else {
            return Ok(ActionOutcome::skipped(format!("no {verb} command")));
        };
        if ctx.dry_run {
            return Ok(ActionOutcome::skipped("dry run"));
        }
        let out = cmd.run_capture(&self.env(ctx))?;
        let detail = out.lines().last().map(str::to_string);
        Ok(ActionOutcome::Done { detail })
    }
}

pub fn is_true_like(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "on"
    )
}
