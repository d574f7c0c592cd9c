//! Model routing: runtime abstraction, TTL inventory cache, task-class
//! routing with fallback and bounded retry.

mod inventory;
mod ollama;
mod router;
mod runtime;

pub use inventory::{InventoryCache, DEFAULT_INVENTORY_TTL};
pub use ollama::OllamaRuntime;
pub use router::{ModelRouter, RouteOptions, RouteOutcome, RoutingTable, TaskClass};
pub use runtime::{
    ChatRole, ChatTurn, GenerateOptions, MockRuntime, ModelEntry, ModelRuntime, RuntimeReply,
};
