#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod client;
pub mod error;
pub mod jsonrpc;
pub mod toolset;
pub mod transport;

pub use client::{InitializeResult, McpClient, PROTOCOL_VERSION, ServerInfo};
pub use error::McpError;
pub use jsonrpc::{JsonRpcNotification, RequestId};
pub use toolset::DeviceTools;
pub use transport::{
    DEFAULT_INBOUND_CAPACITY, DEFAULT_REQUEST_TIMEOUT, Multiplexer, MultiplexerConfig, Outbound,
};
