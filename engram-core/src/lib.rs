//! # Engram Core
//!
//! Per-agent learning memory for autonomous agents.
//! Provides the durable decision/pattern/knowledge store, lexical
//! relevance retrieval, the batch pattern miner, and the
//! context-assembling brain that injects learned history into prompts.

pub mod brain;
pub mod config;
pub mod error;
pub mod events;
pub mod miner;
pub mod relevance;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, GenerateOptions, MockGenerator, TextGenerator, ThinkOptions};
pub use config::{ContextConfig, EngramConfig, MinerConfig, StorageConfig, load_config};
pub use error::{ConfigError, EngramError, EventError, GenerateError, Result, StoreError};
pub use events::{EventSink, NoopEventSink, Severity};
pub use miner::{MineReport, mine_agent, mine_all};
pub use store::{MemoryStore, list_agents};
pub use types::{Decision, Knowledge, MemoryStats, Pattern, ThinkResult};
