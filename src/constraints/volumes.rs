use k8s_openapi::api::core::v1::{Node, PersistentVolume, PersistentVolumeClaim, Pod, Volume};
use serde::Serialize;

use super::node_affinity::node_selector_term_matches;
use super::ConstraintResult;

/// The source backing a pod volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeKind {
    PersistentVolumeClaim { claim_name: String, read_only: bool },
    ConfigMap { name: Option<String> },
    Secret { secret_name: Option<String> },
    EmptyDir,
    HostPath { path: String },
    Projected,
    DownwardApi,
    Other,
}

impl VolumeKind {
    pub fn from_volume(volume: &Volume) -> Self {
        if let Some(pvc) = &volume.persistent_volume_claim {
            Self::PersistentVolumeClaim {
                claim_name: pvc.claim_name.clone(),
                read_only: pvc.read_only.unwrap_or(false),
            }
        } else if let Some(cm) = &volume.config_map {
            Self::ConfigMap { name: cm.name.clone() }
        } else if let Some(secret) = &volume.secret {
            Self::Secret { secret_name: secret.secret_name.clone() }
        } else if volume.empty_dir.is_some() {
            Self::EmptyDir
        } else if let Some(host) = &volume.host_path {
            Self::HostPath { path: host.path.clone() }
        } else if volume.projected.is_some() {
            Self::Projected
        } else if volume.downward_api.is_some() {
            Self::DownwardApi
        } else {
            Self::Other
        }
    }

    pub fn claim_name(&self) -> Option<&str> {
        match self {
            Self::PersistentVolumeClaim { claim_name, .. } => Some(claim_name),
            _ => None,
        }
    }
}

/// A claim-backed pod volume with whatever the provider returned for it.
#[derive(Debug, Clone, Default)]
pub struct ClaimBinding {
    pub volume_name: String,
    pub claim_name: String,
    pub claim: Option<PersistentVolumeClaim>,
    pub volume: Option<PersistentVolume>,
    /// Set when the claim lookup failed for a reason other than absence.
    pub lookup_error: Option<String>,
    /// Set when the claim is bound but its persistent volume could not be read.
    pub volume_lookup_error: Option<String>,
}

impl ClaimBinding {
    pub fn claim_phase(&self) -> Option<&str> {
        self.claim
            .as_ref()
            .and_then(|c| c.status.as_ref())
            .and_then(|s| s.phase.as_deref())
    }

    pub fn bound_volume_name(&self) -> Option<&str> {
        self.claim
            .as_ref()
            .and_then(|c| c.spec.as_ref())
            .and_then(|s| s.volume_name.as_deref())
            .filter(|n| !n.is_empty())
    }

    pub fn access_modes(&self) -> Vec<String> {
        let claim = self.claim.as_ref();
        claim
            .and_then(|c| c.status.as_ref())
            .and_then(|s| s.access_modes.clone())
            .or_else(|| claim.and_then(|c| c.spec.as_ref()).and_then(|s| s.access_modes.clone()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeCheck {
    pub volume: String,
    pub kind: VolumeKind,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeExplanation {
    #[serde(flatten)]
    pub result: ConstraintResult,
    pub volumes: Vec<VolumeCheck>,
    pub multi_attach_risks: Vec<String>,
}

pub fn pod_volume_kinds(pod: &Pod) -> Vec<(String, VolumeKind)> {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .map(|volumes| {
            volumes
                .iter()
                .map(|v| (v.name.clone(), VolumeKind::from_volume(v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Check that each claim-backed volume is bound and that its volume can be
/// reached from `node`. ReadWriteOnce claims are flagged, never failed.
pub fn check_volume_binding(pod: &Pod, bindings: &[ClaimBinding], node: &Node) -> VolumeExplanation {
    let mut failures = Vec::new();
    let mut info = Vec::new();
    let mut volumes = Vec::new();
    let mut multi_attach_risks = Vec::new();

    for (name, kind) in pod_volume_kinds(pod) {
        let Some(claim_name) = kind.claim_name().map(str::to_string) else {
            volumes.push(VolumeCheck { volume: name, kind, status: "not claim-backed".to_string() });
            continue;
        };
        let binding = bindings.iter().find(|b| b.volume_name == name);

        let status = match binding {
            None => {
                info.push(format!("persistentvolumeclaim {} was not looked up", claim_name));
                "unverified".to_string()
            }
            Some(b) if b.lookup_error.is_some() => {
                info.push(format!(
                    "persistentvolumeclaim {} could not be verified: {}",
                    claim_name,
                    b.lookup_error.as_deref().unwrap_or_default()
                ));
                "unverified".to_string()
            }
            Some(b) if b.claim.is_none() => {
                failures.push(format!("persistentvolumeclaim {} not found", claim_name));
                "missing".to_string()
            }
            Some(b) => check_bound_claim(b, node, &mut failures, &mut info, &mut multi_attach_risks),
        };
        volumes.push(VolumeCheck { volume: name, kind, status });
    }

    VolumeExplanation {
        result: ConstraintResult::from_parts(failures, info),
        volumes,
        multi_attach_risks,
    }
}

fn check_bound_claim(
    binding: &ClaimBinding,
    node: &Node,
    failures: &mut Vec<String>,
    info: &mut Vec<String>,
    multi_attach_risks: &mut Vec<String>,
) -> String {
    let claim_name = &binding.claim_name;
    let phase = binding.claim_phase().unwrap_or("Unknown");
    if phase != "Bound" {
        failures.push(format!("persistentvolumeclaim {} is not bound (phase {})", claim_name, phase));
        return phase.to_string();
    }

    if binding.access_modes().iter().any(|m| m == "ReadWriteOnce") {
        multi_attach_risks.push(format!(
            "persistentvolumeclaim {} is ReadWriteOnce and can only be attached to one node at a time",
            claim_name
        ));
    }

    let pv_name = binding.bound_volume_name().unwrap_or("");
    if let Some(err) = binding.volume_lookup_error.as_deref() {
        info.push(format!(
            "persistentvolume {} (claim {}) could not be verified: {}",
            pv_name, claim_name, err
        ));
        return "unverified".to_string();
    }
    let required = binding
        .volume
        .as_ref()
        .and_then(|pv| pv.spec.as_ref())
        .and_then(|s| s.node_affinity.as_ref())
        .and_then(|na| na.required.as_ref());

    match required {
        Some(selector) if !selector.node_selector_terms.is_empty() => {
            let matched = selector
                .node_selector_terms
                .iter()
                .any(|term| node_selector_term_matches(term, node).is_ok());
            if matched {
                info.push(format!(
                    "persistentvolume {} node affinity matches node (claim {})",
                    pv_name, claim_name
                ));
                "Bound".to_string()
            } else {
                failures.push(format!(
                    "volume node affinity conflict: persistentvolume {} (claim {}) is not reachable from node",
                    pv_name, claim_name
                ));
                "NodeAffinityConflict".to_string()
            }
        }
        _ => {
            info.push(format!("persistentvolumeclaim {} is bound to {}", claim_name, pv_name));
            "Bound".to_string()
        }
    }
}
