//! Tabular batch input and output
//!
//! A batch is a CSV file with a header and one row per node. Rows keep every
//! original column so the updated file written after a run carries unknown
//! columns through untouched, with `deployment_status` filled in.

use crate::error::InventoryError;
use crate::node::{DeploymentStatus, NodeDescriptor, PowerSettings, POWER_EXTRA_COLUMNS};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

pub const REQUIRED_COLUMNS: &[&str] = &[
    "hostname",
    "architecture",
    "mac_addresses",
    "power_type",
    "power_user",
    "power_pass",
    "power_driver",
    "power_address",
    "ip",
];

pub const STATUS_COLUMN: &str = "deployment_status";
pub const STORAGE_IP_COLUMN: &str = "storage_ip";
pub const CLOUD_INIT_COLUMN: &str = "cloud_init";
pub const STORAGE_LAYOUT_COLUMN: &str = "storage_layout_template";

/// One input row: the raw values plus the parsed node
#[derive(Debug, Clone)]
pub struct BatchRow {
    /// Raw values, aligned with `Batch::headers`
    pub values: Vec<String>,
    pub node: NodeDescriptor,
    pub status: Option<DeploymentStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub headers: Vec<String>,
    pub rows: Vec<BatchRow>,
}

impl Batch {
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.rows.iter().map(|r| &r.node)
    }

    /// Record the terminal status of the row at `index`
    pub fn set_status(&mut self, index: usize, status: DeploymentStatus) {
        if let Some(row) = self.rows.get_mut(index) {
            row.status = Some(status);
        }
    }
}

/// Header names of a batch file, without parsing its rows
pub fn read_headers(path: &Path) -> Result<Vec<String>, InventoryError> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader.headers()?.iter().map(|h| h.trim().to_string()).collect())
}

/// Read and validate a batch file
pub fn read_batch(path: &Path) -> Result<Batch, InventoryError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(InventoryError::MissingColumn {
                column: column.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let values: Vec<String> = record.iter().map(str::to_string).collect();
        let node = parse_node(&headers, &values, line)?;
        if !seen.insert(node.hostname.clone()) {
            return Err(InventoryError::InvalidRow {
                line,
                reason: format!("duplicate hostname '{}'", node.hostname),
            });
        }
        let status = column(&headers, &values, STATUS_COLUMN).and_then(DeploymentStatus::from_column);
        rows.push(BatchRow { values, node, status });
    }

    info!("Read {} nodes from {}", rows.len(), path.display());
    Ok(Batch { headers, rows })
}

fn column<'a>(headers: &[String], values: &'a [String], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|i| values.get(i))
        .map(|v| v.trim())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_node(headers: &[String], values: &[String], line: u64) -> Result<NodeDescriptor, InventoryError> {
    let get = |name: &str| column(headers, values, name).unwrap_or_default().to_string();

    let hostname = get("hostname");
    if hostname.is_empty() {
        return Err(InventoryError::InvalidRow {
            line,
            reason: "empty hostname".to_string(),
        });
    }

    let extras = POWER_EXTRA_COLUMNS
        .iter()
        .filter_map(|name| column(headers, values, name).map(|v| (name.to_string(), v.to_string())))
        .collect();

    Ok(NodeDescriptor {
        hostname,
        architecture: get("architecture"),
        mac_addresses: split_macs(&get("mac_addresses")),
        power_type: get("power_type"),
        power: PowerSettings {
            user: get("power_user"),
            pass: get("power_pass"),
            driver: get("power_driver"),
            address: get("power_address"),
            extras,
        },
        ip: get("ip"),
        storage_ip: non_empty(column(headers, values, STORAGE_IP_COLUMN)).map(str::to_string),
        storage_layout_template: non_empty(column(headers, values, STORAGE_LAYOUT_COLUMN)).map(PathBuf::from),
        cloud_init_template: non_empty(column(headers, values, CLOUD_INIT_COLUMN)).map(PathBuf::from),
    })
}

/// Split a MAC address cell on commas, semicolons or whitespace
pub fn split_macs(cell: &str) -> Vec<String> {
    cell.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Path of the updated batch file: `<base>_updated.<ext>`
pub fn updated_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("batch");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_updated.{}", stem, ext),
        None => format!("{}_updated", stem),
    };
    path.with_file_name(name)
}

/// Write the batch next to its input with `deployment_status` filled in.
/// Returns the path written.
pub fn write_batch(input_path: &Path, batch: &Batch) -> Result<PathBuf, InventoryError> {
    let output_path = updated_path(input_path);
    let status_index = batch.headers.iter().position(|h| h == STATUS_COLUMN);

    let mut headers = batch.headers.clone();
    if status_index.is_none() {
        headers.push(STATUS_COLUMN.to_string());
    }

    let mut writer = csv::Writer::from_path(&output_path)?;
    writer.write_record(&headers)?;
    for row in &batch.rows {
        let mut values = row.values.clone();
        let status = row.status.map(|s| s.as_str().to_string());
        match status_index {
            Some(i) => {
                if let Some(status) = status {
                    values[i] = status;
                }
            }
            None => values.push(status.unwrap_or_default()),
        }
        writer.write_record(&values)?;
    }
    writer.flush()?;

    info!("Updated CSV with deployment status at {}", output_path.display());
    Ok(output_path)
}
