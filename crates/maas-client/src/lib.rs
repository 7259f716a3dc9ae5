//! MAAS CLI Client
//!
//! A Rust client library for driving a MAAS region controller through the
//! `maas` command-line tool. Provides typed models and one method per CLI
//! call for machine lifecycle and storage layout operations.
//!
//! # Example
//!
//! ```no_run
//! use maas_client::{MaasClient, MaasClientTrait, MachineStatus, NotFoundExt};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client for a profile set up with `maas login`
//! let client = MaasClient::new("admin");
//!
//! // Read a machine's lifecycle status
//! let status = client.read_status("abc123").await?;
//! assert_eq!(status, MachineStatus::Ready);
//!
//! // Deleting something that is already gone is not an error
//! client.delete_volume_group("abc123", 7).await.or_empty()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Machine Lifecycle**: create, read status, update power credentials, deploy
//! - **Storage Layout**: block devices, partitions, volume groups, logical volumes
//! - **Idempotent Deletes**: "not found" answers become empty results via `NotFoundExt`
//! - **Test Double**: `MockMaasClient` behind the `test-util` feature

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod maas_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::MaasClient;
pub use common::MaasCli;
pub use common::op;
pub use error::{MaasError, NotFoundExt};
pub use models::*;
pub use maas_trait::MaasClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockCall, MockFailure, MockMaasClient};
