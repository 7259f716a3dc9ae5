//! Bare-metal batch inventory
//!
//! Types shared by the provisioning tools:
//!
//! - `NodeDescriptor` and `DeploymentStatus`: one node of a batch and its terminal outcome
//! - `Batch`: the tabular input, read with `read_batch` and written back with `write_batch`
//! - `LayoutTemplate`: declarative boot disk layout (boot partitions, volume group, logical volumes)
//! - `parse_size`: the size string grammar used by layout templates

pub mod batch;
pub mod error;
pub mod layout;
pub mod node;
pub mod size;

pub use batch::{read_batch, read_headers, write_batch, Batch, BatchRow};
pub use error::InventoryError;
pub use layout::{is_swap_name, LayoutTemplate, VolumeSpec};
pub use node::{DeploymentStatus, NodeDescriptor, PowerSettings};
pub use size::parse_size;
