use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use error_stack::Report;
use git_kube_watch::config::Cli;
use git_kube_watch::config::Commands;
use git_kube_watch::config::RefreshArgs;
use git_kube_watch::config::WatchArgs;
use git_kube_watch::config::WatchConfig;
use git_kube_watch::kube_client::ClusterAuth;
use git_kube_watch::Reconciler;
use k8s_openapi::api::core::v1::Pod;
use tracing::level_filters::LevelFilter;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = logging::init(level_for(cli.verbose));

    tracing::debug!("Starting git-kube-watch {}", &**version::VERSION);

    let auth = cli.cluster.auth();
    match cli.command {
        Commands::Check(args) => run_check(&auth, &args).await,
        Commands::Create(args) => run_create(&auth, &args).await,
        Commands::Refresh(args) => run_refresh(&auth, &args).await,
        Commands::Reconcile(args) => run_reconcile(&auth, &args).await,
    }
}

async fn run_check(auth: &ClusterAuth, args: &WatchArgs) -> Result<()> {
    let config = load_config(args)?;
    let reconciler = Reconciler::connect(auth).await.map_err(report)?;

    let absent = reconciler.is_absent(&config).await.map_err(report)?;
    println!("{}", serde_json::json!({ "absent": absent }));
    Ok(())
}

async fn run_create(auth: &ClusterAuth, args: &WatchArgs) -> Result<()> {
    let config = load_config(args)?;
    let mut reconciler = Reconciler::connect(auth).await.map_err(report)?;

    let pod = reconciler.create(&config).await.map_err(report)?;
    print_pod("created", &pod)
}

async fn run_refresh(auth: &ClusterAuth, args: &RefreshArgs) -> Result<()> {
    let config = load_config(&args.watch)?;
    let mut reconciler = Reconciler::connect(auth)
        .await
        .map_err(report)?
        .with_refresh_mode(args.refresh_mode());

    let pod = reconciler.refresh(&config).await.map_err(report)?;
    print_pod("refreshed", &pod)
}

async fn run_reconcile(auth: &ClusterAuth, args: &RefreshArgs) -> Result<()> {
    let config = load_config(&args.watch)?;
    let mut reconciler = Reconciler::connect(auth)
        .await
        .map_err(report)?
        .with_refresh_mode(args.refresh_mode());

    let outcome = reconciler.reconcile(&config).await.map_err(report)?;
    print_pod(outcome.action(), &outcome.into_pod())
}

fn load_config(args: &WatchArgs) -> Result<WatchConfig> {
    let mut config = WatchConfig::from_yaml_file(&args.config).map_err(report)?;
    if let Some(namespace) = &args.namespace {
        config.k8s.namespace = namespace.clone();
    }
    tracing::info!(
        config = %args.config.display(),
        namespace = config.namespace(),
        repository = config.repository(),
        "loaded watch config"
    );
    Ok(config)
}

fn print_pod(action: &str, pod: &Pod) -> Result<()> {
    let output = serde_json::json!({ "action": action, "pod": pod });
    let rendered = serde_json::to_string_pretty(&output).context("serialize pod failed")?;
    println!("{rendered}");
    Ok(())
}

/// error-stack reports carry their frames in the `Debug` output.
fn report<C: error_stack::Context>(report: Report<C>) -> anyhow::Error {
    anyhow::anyhow!("{report:?}")
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
