use k8s_openapi::api::core::v1::Node;

use super::ConstraintResult;

/// A node must be Ready and not cordoned to accept new pods. Pressure
/// conditions are reported but do not fail the check.
pub fn check_node_readiness(node: &Node) -> ConstraintResult {
    let mut failures = Vec::new();
    let mut info = Vec::new();

    if node.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false) {
        failures.push("node is cordoned (unschedulable)".to_string());
    }

    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"));
    match ready {
        Some(c) if c.status == "True" => info.push("node is Ready".to_string()),
        Some(c) => failures.push(format!(
            "node is not ready (Ready={}{})",
            c.status,
            c.reason.as_ref().map(|r| format!(", reason {}", r)).unwrap_or_default()
        )),
        None => failures.push("node is not ready (no Ready condition reported)".to_string()),
    }

    info.extend(pressure_conditions(node).into_iter().map(|p| format!("node reports {}", p)));

    ConstraintResult::from_parts(failures, info)
}

fn pressure_conditions(node: &Node) -> Vec<String> {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .filter(|c| {
                    matches!(c.type_.as_str(), "MemoryPressure" | "DiskPressure" | "PIDPressure") && c.status == "True"
                })
                .map(|c| c.type_.clone())
                .collect()
        })
        .unwrap_or_default()
}
