use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use utils::version;

use crate::domain::reconciler::RefreshMode;
use crate::infrastructure::kube_client::ClusterAuth;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[arg(
        long,
        short,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report whether a pod for the repository is absent
    Check(WatchArgs),
    /// Create the pod for the repository
    Create(WatchArgs),
    /// Refresh the first pod matching the repository
    Refresh(RefreshArgs),
    /// Create the pod when absent, refresh it otherwise
    Reconcile(RefreshArgs),
}

#[derive(Args, Clone)]
pub struct ClusterArgs {
    #[arg(
        long,
        global = true,
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to in-cluster service account credentials)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        conflicts_with = "kubeconfig",
        help = "Fall back to $KUBECONFIG or ~/.kube/config when not running inside a cluster"
    )]
    pub infer_credentials: bool,
}

impl ClusterArgs {
    pub fn auth(&self) -> ClusterAuth {
        match (&self.kubeconfig, self.infer_credentials) {
            (Some(path), _) => ClusterAuth::Kubeconfig(path.clone()),
            (None, true) => ClusterAuth::Infer,
            (None, false) => ClusterAuth::InCluster,
        }
    }
}

#[derive(Args, Clone)]
pub struct WatchArgs {
    #[arg(
        long,
        short,
        env = "GIT_KUBE_WATCH_CONFIG",
        value_hint = clap::ValueHint::FilePath,
        default_value = "/etc/git-kube-watch/config.yaml",
        help = "Path to the watch configuration file"
    )]
    pub config: PathBuf,

    #[arg(long, short, help = "Override the namespace from the configuration file")]
    pub namespace: Option<String>,
}

#[derive(Args, Clone)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub watch: WatchArgs,

    #[arg(
        long,
        help = "Submit the fetched pod with its image cleared instead of an empty placeholder pod"
    )]
    pub submit_fetched_pod: bool,
}

impl RefreshArgs {
    pub fn refresh_mode(&self) -> RefreshMode {
        if self.submit_fetched_pod {
            RefreshMode::SubmitFetched
        } else {
            RefreshMode::Placeholder
        }
    }
}
