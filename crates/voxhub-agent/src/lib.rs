#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod agent;
pub mod error;
pub mod openai;
pub mod tools;

pub use agent::{Agent, DEFAULT_MAX_TOOL_ROUNDS};
pub use error::AgentError;
pub use openai::{OpenAiChat, OpenAiChatConfig};
pub use tools::{EXIT_INTENT_TOOL, ExitIntent, Toolbox};
