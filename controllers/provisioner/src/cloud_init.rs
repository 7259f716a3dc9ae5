//! Per-node cloud-init documents
//!
//! Templates use `$name` / `${name}` placeholders. Substitution is safe:
//! placeholders without a value are left verbatim, and `$$` is a literal `$`.

use crate::error::ProvisionError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use inventory::NodeDescriptor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Substitute `values` into `template`, leaving unknown placeholders untouched
pub fn safe_substitute(template: &str, values: &BTreeMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) if is_identifier(&braced[..end]) => (&braced[..end], end + 2),
                _ => ("", 0),
            },
            None => {
                let end = identifier_len(after);
                (&after[..end], end)
            }
        };

        match values.get(name) {
            Some(value) if !name.is_empty() => {
                out.push_str(value);
                rest = &after[consumed..];
            }
            _ => {
                // Unresolved or malformed: keep the `$` and carry on after it
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn identifier_len(text: &str) -> usize {
    let mut chars = text.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && identifier_len(text) == text.len()
}

/// Renders cloud-init documents into an artifact directory
#[derive(Debug, Clone)]
pub struct CloudInitGenerator {
    artifact_dir: PathBuf,
}

impl CloudInitGenerator {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    pub fn artifact_path(&self, hostname: &str) -> PathBuf {
        self.artifact_dir.join(format!("cloud-init-{}.yaml", hostname))
    }

    /// Render the document for one node; `storage_ip` is only substituted when the node has one
    pub fn render(&self, template: &str, node: &NodeDescriptor) -> String {
        let mut values = BTreeMap::new();
        values.insert("ip", node.ip.as_str());
        if let Some(storage_ip) = node.storage_ip.as_deref() {
            values.insert("storage_ip", storage_ip);
        }
        safe_substitute(template, &values)
    }

    /// Render `template_path` for `node` and write it to the node's artifact path
    pub async fn generate(&self, template_path: &Path, node: &NodeDescriptor) -> Result<PathBuf, ProvisionError> {
        let template = tokio::fs::read_to_string(template_path).await.map_err(|e| {
            ProvisionError::Template(format!("cannot read {}: {}", template_path.display(), e))
        })?;
        let rendered = self.render(&template, node);

        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        let path = self.artifact_path(&node.hostname);
        tokio::fs::write(&path, rendered).await?;
        debug!("[{}] Wrote cloud-init to {}", node.hostname, path.display());
        Ok(path)
    }
}

/// Base64-encode an artifact for the `user_data` deploy parameter
pub async fn encode_user_data(path: &Path) -> Result<String, ProvisionError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(STANDARD.encode(bytes))
}
