//! MCP (Model Context Protocol) access to the remote calculation tools.
//!
//! [`McpClient`] speaks the SSE transport. [`CalculationToolset`] wraps it as
//! a [`dptb_core::Toolset`] that attaches the user's [`RemoteBackends`] to
//! every call.

pub mod client;
pub mod descriptor;
pub mod protocol;
pub mod toolset;

pub use client::McpClient;
pub use descriptor::{ExecutorDescriptor, JobResources, RemoteBackends, StorageDescriptor};
pub use protocol::McpToolDef;
pub use toolset::CalculationToolset;
