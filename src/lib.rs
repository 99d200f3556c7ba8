//! Client for the freelance MCP server over stdio.
//!
//! [`ToolClient`] launches the server as a child process, performs the MCP
//! handshake and then issues sequential tool calls and resource reads. Tool
//! results are decoded once into [`ToolCallResult`]; failures of an
//! individual call come back as [`ToolCallResult::Error`] rather than as a
//! Rust error, so a failing tool never aborts the caller.

mod call;
mod capabilities;
mod client;
mod codec;
mod config;
mod error;
mod resource;
mod session;
mod transport;

pub mod freelance;
pub mod schema;
pub mod testutils;

pub use call::{ToolCallRequest, ToolCallResult, NO_VALID_RESPONSE};
pub use capabilities::{Capabilities, Listing};
pub use client::{SessionStatus, ToolClient};
pub use config::{ClientConfig, DEFAULT_API_KEY_VAR};
pub use error::{Error, Result};
pub use resource::ResourceContent;
pub use transport::{Duplex, ProcessTransport, StreamTransport, Transport, TransportStream};
