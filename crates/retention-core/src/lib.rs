pub mod behaviour;
pub mod capability;
pub mod config;
pub mod context;
pub mod disposition;
pub mod error;
pub mod event;
pub mod hold;
pub mod io;
pub mod manager;
pub mod model;
pub mod paths;
pub mod period;
pub mod security;
pub mod store;
pub mod types;
pub mod vital;

pub use context::OperationContext;
pub use error::{Result, RetentionError};
pub use manager::RecordsManager;
pub use store::{InMemoryStore, NodeStore};
