//! Narrow adapter from upstream JSON documents to the types the
//! reconciler consumes.
//!
//! The platform API wraps payloads in a tRPC-style envelope and has been
//! seen returning several shapes for the same call. All of that tolerance
//! lives here; nothing past this module looks at raw JSON.

use serde_json::Value;
use tracing::warn;

use scalekeep_core::{ReplicaCount, ServiceIdentity};

use crate::provider::SourceError;

/// Strip `result` / `data` / `json` wrappers, in that order, if present.
///
/// A level is only unwrapped when the wrapper key stands alone (apart from
/// superjson's `meta`), so a project map that happens to contain a project
/// keyed `data` keeps its siblings.
pub fn unwrap_envelope(doc: &Value) -> &Value {
    let mut payload = doc;
    for key in ["result", "data", "json"] {
        let Value::Object(map) = payload else {
            break;
        };
        let only_envelope = map.keys().all(|k| k == key || k == "meta");
        if let Some(inner) = map.get(key)
            && only_envelope
        {
            payload = inner;
        }
    }
    payload
}

/// Service identities from a projects listing.
///
/// Accepts a list of projects, a single project object, or an object
/// mapping arbitrary keys to projects. Projects and services without a
/// name are skipped, as are names containing `/`, which cannot form a
/// unique `project/service` key.
pub fn parse_inventory(doc: &Value) -> Result<Vec<ServiceIdentity>, SourceError> {
    let payload = unwrap_envelope(doc);
    let projects: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) if map.contains_key("services") || map.contains_key("name") => {
            vec![payload]
        }
        Value::Object(map) => map.values().collect(),
        other => {
            return Err(SourceError::Invalid(format!(
                "expected projects list, got {}",
                type_name(other)
            )));
        }
    };

    let mut ids = Vec::new();
    for project in projects {
        let Some(project_name) = non_empty_str(project.get("name")) else {
            continue;
        };
        let Some(services) = project.get("services").and_then(Value::as_array) else {
            continue;
        };
        for service in services {
            let Some(service_name) = non_empty_str(service.get("name")) else {
                continue;
            };
            match ServiceIdentity::try_new(project_name, service_name) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(
                    project = project_name,
                    service = service_name,
                    error = %e,
                    "skipping service with unusable name"
                ),
            }
        }
    }
    Ok(ids)
}

/// CPU utilization from a service stats document.
///
/// Looks at `cpu`, then `cpuUsage`. A missing or null field is `Ok(None)`;
/// anything that isn't a finite number (or a numeric string) is invalid.
pub fn parse_utilization(doc: &Value) -> Result<Option<f64>, SourceError> {
    let payload = unwrap_envelope(doc);
    let field = ["cpu", "cpuUsage"]
        .into_iter()
        .find_map(|key| payload.get(key).filter(|v| !v.is_null()));

    let Some(value) = field else {
        return Ok(None);
    };
    let cpu = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match cpu {
        Some(cpu) if cpu.is_finite() => Ok(Some(cpu)),
        _ => Err(SourceError::Invalid(format!("cpu value {value} is not a number"))),
    }
}

/// Replica count from a bare integer or a service inspection document
/// (`deploy.replicas`, falling back to a top-level `replicas`).
pub fn parse_replicas(doc: &Value) -> Result<ReplicaCount, SourceError> {
    let payload = unwrap_envelope(doc);
    let value = if payload.is_number() {
        Some(payload)
    } else {
        payload
            .get("deploy")
            .and_then(|deploy| deploy.get("replicas"))
            .or_else(|| payload.get("replicas"))
    };
    let value = value.ok_or_else(|| SourceError::Invalid("no replica count".to_string()))?;
    value
        .as_u64()
        .and_then(|n| ReplicaCount::try_from(n).ok())
        .ok_or_else(|| SourceError::Invalid(format!("replica count {value} is not a count")))
}

/// Whether an exposed-ports document lists any published port.
///
/// Unrecognized shapes count as not exposed, so a bad answer never blocks
/// scaling.
pub fn parse_exposed(doc: &Value) -> bool {
    match unwrap_envelope(doc) {
        Value::Array(ports) => !ports.is_empty(),
        Value::Bool(exposed) => *exposed,
        _ => false,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
