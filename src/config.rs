use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::issues::IssueThresholds;

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Scheduling,
    Health,
    Namespace,
    Cluster,
}

impl FromStr for ReportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduling" => Ok(Self::Scheduling),
            "health" => Ok(Self::Health),
            "namespace" => Ok(Self::Namespace),
            "cluster" => Ok(Self::Cluster),
            other => Err(anyhow!(
                "unknown report '{}' (expected scheduling, health, namespace or cluster)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub report: ReportKind,
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub restart_threshold: i32,
    pub pending_grace_minutes: i64,
    pub timeout_seconds: u64,
    pub pattern_min_occurrences: usize,
    pub enable_node_metrics: bool,
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            timeout: Duration::from_secs(self.timeout_seconds),
            thresholds: IssueThresholds {
                restart_threshold: self.restart_threshold,
                pending_grace: chrono::Duration::minutes(self.pending_grace_minutes),
            },
            pattern_min_occurrences: self.pattern_min_occurrences,
        }
    }

    /// Namespace and pod for the single-pod reports.
    pub fn target_pod(&self) -> Result<(&str, &str)> {
        let pod = self
            .pod
            .as_deref()
            .ok_or_else(|| anyhow!("TARGET_POD must be set for the {:?} report", self.report))?;
        Ok((self.namespace.as_deref().unwrap_or("default"), pod))
    }
}

fn non_empty<E: EnvironmentProvider>(env: &E, key: &str) -> Option<String> {
    env.get_var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let report: ReportKind = env
        .get_var("REPORT")
        .ok_or_else(|| anyhow!("REPORT env var must be set (scheduling|health|namespace|cluster)"))?
        .parse()
        .context("Invalid REPORT")?;

    let namespace = non_empty(env, "TARGET_NAMESPACE");
    let pod = non_empty(env, "TARGET_POD");

    match report {
        ReportKind::Scheduling | ReportKind::Health if pod.is_none() => {
            bail!("TARGET_POD must be set for the {:?} report", report)
        }
        ReportKind::Namespace if namespace.is_none() => {
            bail!("TARGET_NAMESPACE must be set for the namespace report")
        }
        _ => {}
    }

    let restart_threshold: i32 = env.get_var("RESTART_THRESHOLD")
        .unwrap_or_else(|| "5".to_string())
        .parse()
        .unwrap_or(5);

    let pending_grace_minutes: i64 = env.get_var("PENDING_GRACE_MINUTES")
        .unwrap_or_else(|| "5".to_string())
        .parse()
        .unwrap_or(5);

    let timeout_seconds: u64 = env.get_var("REPORT_TIMEOUT_SECONDS")
        .unwrap_or_else(|| "30".to_string())
        .parse()
        .context("Invalid REPORT_TIMEOUT_SECONDS")?;
    if timeout_seconds == 0 {
        bail!("REPORT_TIMEOUT_SECONDS must be greater than zero");
    }

    let pattern_min_occurrences: usize = env.get_var("PATTERN_MIN_OCCURRENCES")
        .unwrap_or_else(|| "3".to_string())
        .parse()
        .context("Invalid PATTERN_MIN_OCCURRENCES")?;

    let enable_node_metrics = env.get_var("ENABLE_NODE_METRICS")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(true);

    Ok(Config {
        report,
        namespace,
        pod,
        restart_threshold,
        pending_grace_minutes,
        timeout_seconds,
        pattern_min_occurrences,
        enable_node_metrics,
    })
}
