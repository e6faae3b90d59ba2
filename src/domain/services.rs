//! Cloud service catalog and argument normalization for the catalog tools

use serde::Serialize;

use crate::domain::registry::ToolError;

pub const MAX_SERVICES_LIMIT: u32 = 100;

pub const SUPPORTED_SERVICES: [(&str, &str); 12] = [
    ("ecs", "Elastic Compute Service (ECS)"),
    ("oos", "Operations Orchestration Service (OOS)"),
    ("rds", "Relational Database Service (RDS)"),
    ("vpc", "Virtual Private Cloud (VPC)"),
    ("slb", "Server Load Balancer (SLB)"),
    ("ess", "Elastic Scaling (ESS)"),
    ("ros", "Resource Orchestration Service (ROS)"),
    ("cbn", "Cloud Enterprise Network (CBN)"),
    ("dds", "MongoDB Database Service (DDS)"),
    (
        "r-kvstore",
        "Cloud database Tair (compatible with Redis) (R-KVStore)",
    ),
    ("oss", "Object Storage Service (OSS)"),
    ("cloudmonitor", "CloudMonitor Service"),
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServiceEntry {
    pub key: String,
    pub name: String,
}

/// Resolves configured keys against the catalog. Keys the catalog does not know are kept,
/// using the key as display name. `None` selects the whole catalog.
pub fn resolve_services(keys: Option<&[String]>) -> Vec<ServiceEntry> {
    let Some(keys) = keys else {
        return SUPPORTED_SERVICES
            .iter()
            .map(|(key, name)| ServiceEntry {
                key: key.to_string(),
                name: name.to_string(),
            })
            .collect();
    };

    let mut entries: Vec<ServiceEntry> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() || entries.iter().any(|entry| entry.key == key) {
            continue;
        }

        let name = SUPPORTED_SERVICES
            .iter()
            .find(|(known, _)| *known == key)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| key.clone());
        entries.push(ServiceEntry { key, name });
    }
    entries
}

pub fn normalize_name_contains(name_contains: Option<String>) -> Option<String> {
    name_contains
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
}

pub fn normalize_services_limit(limit: Option<u32>) -> Result<usize, ToolError> {
    let limit = limit.unwrap_or(MAX_SERVICES_LIMIT);
    if limit == 0 || limit > MAX_SERVICES_LIMIT {
        return Err(ToolError::new(format!(
            "limit must be between 1 and {MAX_SERVICES_LIMIT}"
        )));
    }
    Ok(limit as usize)
}

pub fn filter_services_by_name_contains(
    services: Vec<ServiceEntry>,
    name_contains: Option<&str>,
) -> Vec<ServiceEntry> {
    let Some(needle) = name_contains else {
        return services;
    };

    services
        .into_iter()
        .filter(|entry| {
            entry.key.contains(needle) || entry.name.to_ascii_lowercase().contains(needle)
        })
        .collect()
}
