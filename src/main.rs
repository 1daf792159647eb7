use anyhow::{Context, Result};
use kube::Client;
use tracing::info;

use kube_pod_doctor::config::{load_config, Config, ReportKind};
use kube_pod_doctor::{DiagnosticEngine, KubeClusterState, Report};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!(report = ?cfg.report, namespace = ?cfg.namespace, pod = ?cfg.pod, "starting");

    let client = Client::try_default().await.context("connect to the Kubernetes API")?;
    let provider = KubeClusterState::new(client, cfg.enable_node_metrics);
    let engine = DiagnosticEngine::new(provider, cfg.engine_config());

    let report = run_report(&engine, &cfg).await?;
    info!(has_issues = report.has_issues(), "{}", report.summary());

    // stdout carries only the report; logs go to stderr
    println!("{}", report.to_json().context("serialize report")?);
    Ok(())
}

async fn run_report(engine: &DiagnosticEngine<KubeClusterState>, cfg: &Config) -> Result<Report> {
    let report = match cfg.report {
        ReportKind::Scheduling => {
            let (ns, pod) = cfg.target_pod()?;
            Report::Scheduling(engine.explain_scheduling(ns, pod).await?)
        }
        ReportKind::Health => {
            let (ns, pod) = cfg.target_pod()?;
            Report::Health(engine.pod_health(ns, pod).await?)
        }
        ReportKind::Namespace => {
            let ns = cfg.namespace.as_deref().unwrap_or("default");
            Report::Namespace(engine.namespace_errors(ns).await?)
        }
        ReportKind::Cluster => Report::Cluster(engine.cluster_issues(cfg.namespace.as_deref()).await?),
    };
    Ok(report)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
