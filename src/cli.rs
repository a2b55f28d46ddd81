use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::parse_duration;
use crate::request::RequestParams;
use crate::ui::Format;

#[derive(Parser)]
#[command(name = "om")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Cluster agent - act on objects and nodes, here, on a peer, or through the daemon", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Human, global = true)]
    pub format: Format,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Act on objects matching a selector
    #[command(visible_alias = "o")]
    Object(ObjectArgs),

    /// Act on cluster nodes
    #[command(subcommand)]
    Node(NodeCommand),

    /// Control the local daemon
    #[command(subcommand)]
    Daemon(DaemonCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Action flags
// ============================================================================

/// Options shared by every routed action
#[derive(Args, Debug, Clone, Default)]
pub struct ActionFlags {
    /// Run synchronously on these nodes (comma-separated globs)
    #[arg(long, global = true)]
    pub node: Option<String>,

    /// Run on this node, bypassing the daemon
    #[arg(long, global = true)]
    pub local: bool,

    /// Resource id selector (comma-separated rids or groups)
    #[arg(long, global = true)]
    pub rid: Option<String>,

    /// Resource subset selector
    #[arg(long, global = true)]
    pub subset: Option<String>,

    /// Resource tag selector
    #[arg(long, global = true)]
    pub tag: Option<String>,

    /// Do not take the object action lock
    #[arg(long, global = true)]
    pub no_lock: bool,

    /// How long to wait for the object action lock (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration, global = true)]
    pub waitlock: Option<Duration>,

    /// Report what would be done without doing it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Allow dangerous operations
    #[arg(long, global = true)]
    pub force: bool,

    /// Run leader-only steps on this node
    #[arg(long, global = true)]
    pub leader: bool,

    /// Stop the plan after this resource (either direction)
    #[arg(long, global = true)]
    pub to: Option<String>,

    /// Stop a forward plan after this resource
    #[arg(long, global = true)]
    pub upto: Option<String>,

    /// Stop a backward plan after this resource
    #[arg(long, global = true)]
    pub downto: Option<String>,

    /// Do not roll back completed steps on failure
    #[arg(long, global = true)]
    pub disable_rollback: bool,

    /// Wait for the target state to be reached
    #[arg(long, global = true)]
    pub wait: bool,

    /// Print the selected units' events while running
    #[arg(long, global = true)]
    pub watch: bool,

    /// Deadline of --wait and --watch (e.g. 5m)
    #[arg(long, value_parser = parse_duration, global = true)]
    pub time: Option<Duration>,
}

impl ActionFlags {
    pub fn into_params(self, selector: Option<String>) -> RequestParams {
        RequestParams {
            selector,
            node: self.node,
            local: self.local,
            rid: self.rid,
            subset: self.subset,
            tag: self.tag,
            no_lock: self.no_lock,
            lock_timeout: self.waitlock,
            dry_run: self.dry_run,
            force: self.force,
            leader: self.leader,
            to: self.to,
            upto: self.upto,
            downto: self.downto,
            disable_rollback: self.disable_rollback,
            wait: self.wait,
            watch: self.watch,
            time: self.time,
            ..RequestParams::default()
        }
    }
}

// ============================================================================
// Object Commands
// ============================================================================

#[derive(Args)]
pub struct ObjectArgs {
    /// Object selector, e.g. `web`, `ns1/svc/*`, `**`, `*/svc/a+*/svc/b`
    pub selector: String,

    #[command(flatten)]
    pub flags: ActionFlags,

    #[command(subcommand)]
    pub verb: ObjectVerb,
}

/// `--kw` arguments of the keyword verbs
#[derive(Args, Debug, Clone, Default)]
pub struct KeywordArgs {
    /// Keyword as `section.key` (`key` alone is in DEFAULT); `set` takes `section.key=value`
    #[arg(long = "kw", required = true)]
    pub kw: Vec<String>,
}

#[derive(Subcommand)]
pub enum ObjectVerb {
    /// Create the object configuration
    Create {
        /// Start from this configuration file
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Delete the object configuration
    Delete,
    /// Unprovision then delete
    Purge,
    /// Show raw keyword values
    Get(KeywordArgs),
    /// Show keyword values with references substituted
    Eval(KeywordArgs),
    /// Set keyword values
    Set(KeywordArgs),
    /// Remove keywords
    Unset(KeywordArgs),
    /// Start the resources
    Start,
    /// Stop the resources
    Stop,
    /// Stop then start
    Restart,
    /// Stop automatic orchestration
    Freeze,
    /// Resume automatic orchestration
    Unfreeze,
    /// Allocate the resources
    Provision,
    /// Release the resources
    Unprovision,
    /// Move the object to another node
    Switch {
        /// Destination node
        destination: String,
    },
    /// Move the object to this node
    Takeover,
    /// Move the object back to its preferred node
    Giveback,
    /// Cancel the pending target state
    Abort,
    /// Run the resources' `run` commands
    Run,
    /// Incremental data sync
    SyncUpdate,
    /// Resynchronize data
    SyncResync,
    /// Full data sync
    SyncFull,
    /// Start persistent reservations
    Prstart,
    /// Stop persistent reservations
    Prstop,
    /// Show resource and object availability
    Status,
    /// Show the object action log
    Logs,
    /// Open a shell in a resource
    Enter,
    /// Stream the objects' events
    Monitor,
}

impl ObjectVerb {
    /// Action table name of the verb
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Delete => "delete",
            Self::Purge => "purge",
            Self::Get(_) => "get",
            Self::Eval(_) => "eval",
            Self::Set(_) => "set",
            Self::Unset(_) => "unset",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
            Self::Provision => "provision",
            Self::Unprovision => "unprovision",
            Self::Switch { .. } => "switch",
            Self::Takeover => "takeover",
            Self::Giveback => "giveback",
            Self::Abort => "abort",
            Self::Run => "run",
            Self::SyncUpdate => "sync_update",
            Self::SyncResync => "sync_resync",
            Self::SyncFull => "sync_full",
            Self::Prstart => "prstart",
            Self::Prstop => "prstop",
            Self::Status => "status",
            Self::Logs => "logs",
            Self::Enter => "enter",
            Self::Monitor => "monitor",
        }
    }
}

// ============================================================================
// Node Commands
// ============================================================================

#[derive(Args)]
pub struct NodeActionArgs {
    /// Nodes to declare the target for (default: this node)
    pub nodes: Option<String>,

    #[command(flatten)]
    pub flags: ActionFlags,
}

#[derive(Subcommand)]
pub enum NodeCommand {
    /// Freeze node orchestration
    Freeze(NodeActionArgs),

    /// Thaw node orchestration
    Unfreeze(NodeActionArgs),

    /// Move every object off the node
    Drain(NodeActionArgs),

    /// Run the configured check drivers
    Checks {
        /// Drivers run at once
        #[arg(short, long, default_value = "4")]
        jobs: usize,
    },

    /// Join a cluster through one of its nodes
    Join {
        /// API url of a cluster member
        #[arg(long)]
        server: String,

        /// Join token issued by the cluster
        #[arg(long)]
        token: String,
    },

    /// Leave the cluster
    Leave {
        /// How long to wait for the cluster's answer
        #[arg(long, value_parser = parse_duration, default_value = "60s")]
        time: Duration,
    },

    /// Stream cluster events
    Events {
        /// Only events of these kinds
        #[arg(long)]
        kind: Vec<String>,

        /// Only events for this object path
        #[arg(long)]
        path: Option<String>,

        /// Stop after this long
        #[arg(long, value_parser = parse_duration, default_value = "10m")]
        time: Duration,
    },
}

// ============================================================================
// Daemon Commands
// ============================================================================

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon
    Start {
        /// Run the daemon in this process
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the daemon
    Stop,

    /// Stop then start the daemon
    Restart {
        /// Run the daemon in this process
        #[arg(long)]
        foreground: bool,
    },

    /// Exit 0 if the daemon answers
    Running,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_after_verb() {
        let cli = Cli::try_parse_from(["om", "o", "ns1/svc/*", "start", "--rid", "app", "--upto", "app#2", "--wait"])
            .unwrap();
        let Command::Object(args) = cli.command else {
            panic!("not an object command");
        };
        assert_eq!(args.verb.name(), "start");
        let params = args.flags.into_params(Some(args.selector));
        assert_eq!(params.selector.as_deref(), Some("ns1/svc/*"));
        assert_eq!(params.rid.as_deref(), Some("app"));
        assert_eq!(params.upto.as_deref(), Some("app#2"));
        assert!(params.wait);
    }

    #[test]
    fn test_verb_arguments() {
        let cli = Cli::try_parse_from(["om", "object", "web", "switch", "n2"]).unwrap();
        let Command::Object(args) = cli.command else {
            panic!("not an object command");
        };
        assert!(matches!(args.verb, ObjectVerb::Switch { ref destination } if destination == "n2"));

        let cli = Cli::try_parse_from(["om", "object", "web", "set", "--kw", "app#1.start=true", "--kw", "x=1"])
            .unwrap();
        let Command::Object(args) = cli.command else {
            panic!("not an object command");
        };
        assert!(matches!(args.verb, ObjectVerb::Set(ref k) if k.kw.len() == 2));

        let cli = Cli::try_parse_from(["om", "object", "web", "sync-update"]).unwrap();
        let Command::Object(args) = cli.command else {
            panic!("not an object command");
        };
        assert_eq!(args.verb.name(), "sync_update");
    }

    #[test]
    fn test_node_action_with_node() {
        let cli = Cli::try_parse_from(["om", "node", "freeze", "--node", "n2", "--format", "json"]).unwrap();
        assert_eq!(cli.format, Format::Json);
        let Command::Node(NodeCommand::Freeze(args)) = cli.command else {
            panic!("not node freeze");
        };
        assert!(args.nodes.is_none());
        assert_eq!(args.flags.node.as_deref(), Some("n2"));
    }
}
