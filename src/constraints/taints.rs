use k8s_openapi::api::core::v1::{Node, Pod, Taint, Toleration};
use serde::Serialize;

use super::ConstraintResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
    Other(String),
}

impl TaintEffect {
    pub fn parse(effect: &str) -> Self {
        match effect {
            "NoSchedule" => Self::NoSchedule,
            "PreferNoSchedule" => Self::PreferNoSchedule,
            "NoExecute" => Self::NoExecute,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the effect keeps new pods off the node.
    pub fn blocks_scheduling(&self) -> bool {
        matches!(self, Self::NoSchedule | Self::NoExecute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaintExplanation {
    #[serde(flatten)]
    pub result: ConstraintResult,
    pub tolerated: Vec<String>,
    pub untolerated: Vec<String>,
}

pub fn describe_taint(taint: &Taint) -> String {
    match taint.value.as_deref() {
        Some(v) if !v.is_empty() => format!("{}={}:{}", taint.key, v, taint.effect),
        _ => format!("{}:{}", taint.key, taint.effect),
    }
}

/// Kubernetes toleration semantics: empty key and empty effect are wildcards,
/// `Exists` ignores the value, `Equal` (the default) compares it exactly.
pub fn toleration_matches(toleration: &Toleration, taint: &Taint) -> bool {
    let key_ok = match toleration.key.as_deref() {
        None | Some("") => true,
        Some(k) => k == taint.key,
    };
    let effect_ok = match toleration.effect.as_deref() {
        None | Some("") => true,
        Some(e) => e == taint.effect,
    };
    let value_ok = match toleration.operator.as_deref() {
        Some("Exists") => true,
        Some("Equal") | None | Some("") => {
            toleration.value.as_deref().unwrap_or("") == taint.value.as_deref().unwrap_or("")
        }
        Some(_) => false,
    };
    key_ok && effect_ok && value_ok
}

pub fn check_taints(pod: &Pod, node: &Node) -> TaintExplanation {
    let taints = node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_deref())
        .unwrap_or(&[]);
    let tolerations = pod
        .spec
        .as_ref()
        .and_then(|s| s.tolerations.as_deref())
        .unwrap_or(&[]);

    let mut tolerated = Vec::new();
    let mut untolerated = Vec::new();
    let mut info = Vec::new();

    for taint in taints {
        let effect = TaintEffect::parse(&taint.effect);
        let is_tolerated = tolerations.iter().any(|t| toleration_matches(t, taint));
        let described = describe_taint(taint);
        if !effect.blocks_scheduling() {
            info.push(format!("taint {} does not block scheduling", described));
            continue;
        }
        if is_tolerated {
            info.push(format!("taint {} tolerated", described));
            tolerated.push(described);
        } else {
            untolerated.push(described);
        }
    }

    let failures = untolerated
        .iter()
        .map(|t| format!("node has untolerated taint {}", t))
        .collect();

    TaintExplanation {
        result: ConstraintResult::from_parts(failures, info),
        tolerated,
        untolerated,
    }
}
