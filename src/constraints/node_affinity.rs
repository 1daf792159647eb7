use k8s_openapi::api::core::v1::{Node, NodeSelectorRequirement, NodeSelectorTerm, Pod};

use super::ConstraintResult;
use crate::inspect::{node_labels, node_name};

/// Operator of a node selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
    Unknown(String),
}

impl SelectorOperator {
    pub fn parse(op: &str) -> Self {
        match op {
            "In" => Self::In,
            "NotIn" => Self::NotIn,
            "Exists" => Self::Exists,
            "DoesNotExist" => Self::DoesNotExist,
            "Gt" => Self::Gt,
            "Lt" => Self::Lt,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Check `nodeSelector`, required node affinity and preferred node affinity.
///
/// Preferred terms only ever add informational reasons.
pub fn check_node_affinity(pod: &Pod, node: &Node) -> ConstraintResult {
    let mut failures = Vec::new();
    let mut info = Vec::new();
    let labels = node_labels(node);

    let Some(spec) = pod.spec.as_ref() else {
        return ConstraintResult::satisfied(info);
    };

    for (key, want) in spec.node_selector.iter().flatten() {
        match labels.get(key) {
            None => failures.push(format!("node is missing label {} required by nodeSelector", key)),
            Some(have) if have != want => failures.push(format!(
                "node label {}={} does not match nodeSelector {}={}",
                key, have, key, want
            )),
            Some(_) => info.push(format!("nodeSelector {}={} matched", key, want)),
        }
    }

    let node_affinity = spec.affinity.as_ref().and_then(|a| a.node_affinity.as_ref());

    if let Some(required) = node_affinity.and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref()) {
        let terms = &required.node_selector_terms;
        if !terms.is_empty() {
            let mut term_failures = Vec::new();
            let mut matched = None;
            for (i, term) in terms.iter().enumerate() {
                match node_selector_term_matches(term, node) {
                    Ok(descriptions) => {
                        matched = Some((i, descriptions));
                        break;
                    }
                    Err(reason) => term_failures.push(format!("node affinity term {}: {}", i, reason)),
                }
            }
            match matched {
                Some((i, descriptions)) => info.push(format!(
                    "required node affinity term {} matched ({})",
                    i,
                    descriptions.join(", ")
                )),
                None => {
                    failures.push("no required node affinity term matched".to_string());
                    failures.extend(term_failures);
                }
            }
        }
    }

    for preferred in node_affinity
        .and_then(|na| na.preferred_during_scheduling_ignored_during_execution.as_ref())
        .into_iter()
        .flatten()
    {
        let outcome = if node_selector_term_matches(&preferred.preference, node).is_ok() {
            "matched"
        } else {
            "not matched"
        };
        info.push(format!(
            "preferred node affinity term (weight {}) {}",
            preferred.weight, outcome
        ));
    }

    ConstraintResult::from_parts(failures, info)
}

/// Match a node selector term (AND of all expressions and fields).
///
/// Returns descriptions of the matched requirements, or the first mismatch.
pub fn node_selector_term_matches(term: &NodeSelectorTerm, node: &Node) -> Result<Vec<String>, String> {
    let expressions = term.match_expressions.as_deref().unwrap_or(&[]);
    let fields = term.match_fields.as_deref().unwrap_or(&[]);
    if expressions.is_empty() && fields.is_empty() {
        return Err("term has no requirements".to_string());
    }

    let labels = node_labels(node);
    let mut matched = Vec::with_capacity(expressions.len() + fields.len());
    for req in expressions {
        matched.push(requirement_matches(req, labels.get(&req.key).map(String::as_str), "label")?);
    }
    for req in fields {
        // metadata.name is the only field the scheduler resolves
        let value = (req.key == "metadata.name").then(|| node_name(node));
        matched.push(requirement_matches(req, value, "field")?);
    }
    Ok(matched)
}

fn requirement_matches(req: &NodeSelectorRequirement, value: Option<&str>, what: &str) -> Result<String, String> {
    let values = req.values.as_deref().unwrap_or(&[]);
    let key = &req.key;
    match SelectorOperator::parse(&req.operator) {
        SelectorOperator::In => match value {
            Some(v) if values.iter().any(|want| want == v) => Ok(format!("{} {}={} in {:?}", what, key, v, values)),
            Some(v) => Err(format!("{} {}={} not in {:?}", what, key, v, values)),
            None => Err(format!("{} {} is not set (expected one of {:?})", what, key, values)),
        },
        SelectorOperator::NotIn => match value {
            Some(v) if values.iter().any(|bad| bad == v) => Err(format!("{} {}={} is in excluded set {:?}", what, key, v, values)),
            _ => Ok(format!("{} {} not in {:?}", what, key, values)),
        },
        SelectorOperator::Exists => match value {
            Some(_) => Ok(format!("{} {} exists", what, key)),
            None => Err(format!("{} {} does not exist", what, key)),
        },
        SelectorOperator::DoesNotExist => match value {
            Some(v) => Err(format!("{} {}={} exists but must not", what, key, v)),
            None => Ok(format!("{} {} does not exist", what, key)),
        },
        // Numeric comparison is not evaluated; Gt/Lt are always treated as satisfied.
        SelectorOperator::Gt | SelectorOperator::Lt => Ok(format!("{} {} {} {:?} (not evaluated)", what, key, req.operator, values)),
        SelectorOperator::Unknown(op) => Err(format!("unsupported operator {} on {} {}", op, what, key)),
    }
}
