use k8s_openapi::api::core::v1::{Node, Pod};
use serde::Serialize;
use tracing::warn;

use super::ConstraintResult;
use crate::inspect::pod_key;
use crate::parsing::{bytes_from_list, cpu_from_list, format_bytes, format_millicores, QuantityTotal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ResourceAxis {
    Cpu,
    Memory,
    EphemeralStorage,
}

impl ResourceAxis {
    pub const ALL: [ResourceAxis; 3] = [Self::Cpu, Self::Memory, Self::EphemeralStorage];

    /// Resource name as it appears in Kubernetes resource lists.
    pub fn resource_name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::EphemeralStorage => "ephemeral-storage",
        }
    }

    fn format(self, amount: i64) -> String {
        match self {
            Self::Cpu => format_millicores(amount),
            Self::Memory | Self::EphemeralStorage => format_bytes(amount),
        }
    }
}

/// Resource amounts in millicores (cpu) and bytes (memory, ephemeral-storage).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceAmounts {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
}

impl ResourceAmounts {
    pub fn get(&self, axis: ResourceAxis) -> i64 {
        match axis {
            ResourceAxis::Cpu => self.cpu_millicores,
            ResourceAxis::Memory => self.memory_bytes,
            ResourceAxis::EphemeralStorage => self.ephemeral_storage_bytes,
        }
    }
}

/// Allocatable amounts; `None` where the node does not report the resource.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeAllocatable {
    pub cpu_millicores: Option<i64>,
    pub memory_bytes: Option<i64>,
    pub ephemeral_storage_bytes: Option<i64>,
}

impl NodeAllocatable {
    pub fn from_node(node: &Node) -> Self {
        let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
        Self {
            cpu_millicores: cpu_from_list(allocatable),
            memory_bytes: bytes_from_list(allocatable, "memory"),
            ephemeral_storage_bytes: bytes_from_list(allocatable, "ephemeral-storage"),
        }
    }

    pub fn get(&self, axis: ResourceAxis) -> Option<i64> {
        match axis {
            ResourceAxis::Cpu => self.cpu_millicores,
            ResourceAxis::Memory => self.memory_bytes,
            ResourceAxis::EphemeralStorage => self.ephemeral_storage_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceShortage {
    pub resource: ResourceAxis,
    pub requested: i64,
    pub allocatable: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceExplanation {
    pub fits: bool,
    pub requested: ResourceAmounts,
    pub allocatable: NodeAllocatable,
    pub shortages: Vec<ResourceShortage>,
    #[serde(flatten)]
    pub result: ConstraintResult,
}

/// Sum requests over the pod's regular containers. Init containers are not counted.
///
/// A contribution that would overflow the running total is logged and dropped.
pub fn sum_pod_requests(pod: &Pod) -> ResourceAmounts {
    let mut totals = [QuantityTotal::default(); 3];
    let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or(&[]);

    for container in containers {
        let requests = container.resources.as_ref().and_then(|r| r.requests.as_ref());
        let values = [
            cpu_from_list(requests),
            bytes_from_list(requests, "memory"),
            bytes_from_list(requests, "ephemeral-storage"),
        ];
        for ((axis, total), value) in ResourceAxis::ALL.iter().zip(totals.iter_mut()).zip(values) {
            let Some(value) = value else { continue };
            if let Err(err) = total.add(value) {
                warn!(
                    pod = %pod_key(pod),
                    container = %container.name,
                    resource = axis.resource_name(),
                    error = %err,
                    "dropping resource request that overflows the pod total"
                );
            }
        }
    }

    ResourceAmounts {
        cpu_millicores: totals[0].value(),
        memory_bytes: totals[1].value(),
        ephemeral_storage_bytes: totals[2].value(),
    }
}

pub fn check_resource_fit(pod: &Pod, node: &Node) -> ResourceExplanation {
    let requested = sum_pod_requests(pod);
    let allocatable = NodeAllocatable::from_node(node);

    let mut shortages = Vec::new();
    let mut failures = Vec::new();
    let mut info = Vec::new();

    for axis in ResourceAxis::ALL {
        let want = requested.get(axis);
        let Some(have) = allocatable.get(axis) else { continue };
        if want == 0 {
            continue;
        }
        if want > have {
            failures.push(format!(
                "Insufficient {}: requested {}, allocatable {}",
                axis.resource_name(),
                axis.format(want),
                axis.format(have)
            ));
            shortages.push(ResourceShortage {
                resource: axis,
                requested: want,
                allocatable: have,
            });
        } else {
            info.push(format!(
                "{} request {} fits allocatable {}",
                axis.resource_name(),
                axis.format(want),
                axis.format(have)
            ));
        }
    }

    ResourceExplanation {
        fits: shortages.is_empty(),
        requested,
        allocatable,
        shortages,
        result: ConstraintResult::from_parts(failures, info),
    }
}
