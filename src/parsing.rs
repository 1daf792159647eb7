use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;
use tracing::warn;

pub fn parse_cpu_to_millicores(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    if let Some(stripped) = q.strip_suffix('n') {
        if let Ok(nanos) = stripped.parse::<i128>() {
            return Some((nanos / 1_000_000) as i64);
        }
    } else if let Some(stripped) = q.strip_suffix('u') {
        if let Ok(micros) = stripped.parse::<i128>() {
            return Some((micros / 1_000) as i64);
        }
    } else if let Some(stripped) = q.strip_suffix('m') {
        if let Ok(mc) = stripped.parse::<i64>() {
            return Some(mc);
        }
    } else {
        // whole or fractional cores
        if let Ok(cores) = q.parse::<f64>() {
            return Some((cores * 1000.0).round() as i64);
        }
    }
    None
}

/// Parse a byte quantity (memory or ephemeral-storage).
pub fn parse_memory_to_bytes(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }

    // Binary suffixes first so "Mi" is not read as "M" + garbage.
    const BINARY_UNITS: &[(&str, i64)] = &[
        ("Ki", 1024),
        ("Mi", 1024 * 1024),
        ("Gi", 1024 * 1024 * 1024),
        ("Ti", 1024_i64.pow(4)),
        ("Pi", 1024_i64.pow(5)),
        ("Ei", 1024_i64.pow(6)),
    ];
    const DECIMAL_UNITS: &[(&str, i64)] = &[
        ("K", 1000),
        ("M", 1000 * 1000),
        ("G", 1000 * 1000 * 1000),
        ("T", 1000_i64.pow(4)),
        ("P", 1000_i64.pow(5)),
        ("E", 1000_i64.pow(6)),
        ("k", 1000),
    ];

    for (suf, mul) in BINARY_UNITS.iter().chain(DECIMAL_UNITS) {
        if let Some(stripped) = q.strip_suffix(suf) {
            if let Ok(v) = stripped.parse::<f64>() {
                return finite_bytes(v * (*mul as f64));
            }
        }
    }
    // Milli-bytes, rounded up. 1.2Gi is stored as "1288490188800m".
    if let Some(stripped) = q.strip_suffix('m') {
        if let Ok(millis) = stripped.parse::<i128>() {
            let bytes = (millis + 999).div_euclid(1000);
            return i64::try_from(bytes).ok();
        }
        if let Ok(v) = stripped.parse::<f64>() {
            return finite_bytes((v / 1000.0).ceil());
        }
        return None;
    }
    if let Ok(v) = q.parse::<i64>() {
        return Some(v);
    }
    // Decimal exponent ("1e9", "5E6"). A bare trailing E was handled above as exa.
    if q.contains(['e', 'E']) && q.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        if let Ok(v) = q.parse::<f64>() {
            return finite_bytes(v);
        }
    }
    None
}

fn finite_bytes(bytes: f64) -> Option<i64> {
    if !bytes.is_finite() || bytes > i64::MAX as f64 {
        return None;
    }
    Some(bytes.round() as i64)
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("quantity overflow adding {addend} to {total}")]
pub struct QuantityOverflow {
    pub total: i64,
    pub addend: i64,
}

/// Running total of a resource quantity that refuses to wrap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QuantityTotal {
    value: i64,
}

impl QuantityTotal {
    /// Add a contribution. On overflow the total is left unchanged.
    pub fn add(&mut self, addend: i64) -> Result<(), QuantityOverflow> {
        let next = self
            .value
            .checked_add(addend)
            .ok_or(QuantityOverflow { total: self.value, addend })?;
        self.value = next;
        Ok(())
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

/// Look up a CPU quantity (millicores) in a resource list.
pub fn cpu_from_list(list: Option<&BTreeMap<String, Quantity>>) -> Option<i64> {
    lookup_quantity(list, "cpu", parse_cpu_to_millicores)
}

/// Look up a byte quantity in a resource list.
pub fn bytes_from_list(list: Option<&BTreeMap<String, Quantity>>, key: &str) -> Option<i64> {
    lookup_quantity(list, key, parse_memory_to_bytes)
}

fn lookup_quantity(
    list: Option<&BTreeMap<String, Quantity>>,
    key: &str,
    parse: fn(&str) -> Option<i64>,
) -> Option<i64> {
    let quantity = list.and_then(|l| l.get(key))?;
    let parsed = parse(&quantity.0);
    if parsed.is_none() {
        warn!(resource = key, quantity = %quantity.0, "ignoring unparseable resource quantity");
    }
    parsed
}

pub fn utilization_percent(used: i64, total: i64) -> Option<f64> {
    if total > 0 {
        Some(used as f64 / total as f64 * 100.0)
    } else {
        None
    }
}

pub fn format_millicores(mc: i64) -> String {
    format!("{}m", mc)
}

pub fn format_bytes(bytes: i64) -> String {
    const MI: i64 = 1024 * 1024;
    const GI: i64 = 1024 * MI;
    if bytes >= GI && bytes % GI == 0 {
        format!("{}Gi", bytes / GI)
    } else if bytes >= MI && bytes % MI == 0 {
        format!("{}Mi", bytes / MI)
    } else {
        format!("{}", bytes)
    }
}
