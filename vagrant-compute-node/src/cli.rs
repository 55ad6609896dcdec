//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// vagrant-compute node - Vagrant machine lifecycle manager
#[derive(Parser, Debug)]
#[command(name = "vagrant-compute-node")]
#[command(about = "vagrant-compute node - Vagrant machine lifecycle manager")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Provider home holding `boxes/` and the machine groups
    #[arg(long, global = true, env = "VAGRANT_COMPUTE_HOME")]
    pub home: Option<PathBuf>,

    /// Enable development mode (simulated machines, no vagrant binary needed)
    #[arg(long, global = true)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operation to run.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every known node
    Nodes,
    /// Show one node
    Node {
        /// Node id, `<group>/<name>`
        id: String,
    },
    /// List bootable images
    Images,
    /// List hardware profiles
    Hardware,
    /// Create and boot a node
    Create {
        group: String,
        name: String,
        /// Image id, `<box>/<version>/<provider>`
        #[arg(long)]
        image: String,
        /// Hardware profile or `automatic:cores=N;ram=M`
        #[arg(long)]
        hardware: String,
        /// Extra network, may be repeated
        #[arg(long = "network")]
        networks: Vec<String>,
        /// Guest hostname (defaults to the machine name)
        #[arg(long)]
        hostname: Option<String>,
    },
    /// Destroy a node
    Destroy { id: String },
    /// Halt and boot a node again
    Reboot { id: String },
    /// Halt a node, keeping it on disk
    Suspend { id: String },
    /// Boot a halted node
    Resume { id: String },
    /// Poll nodes and report changes until interrupted
    Watch {
        /// Override the configured poll interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}
