//! Sub-servers: the MCP tool surfaces composed from the backends.

pub mod chains;
pub mod graph_memory;
pub mod model;
pub mod notebook;
pub mod tasks;

pub use chains::{ChainServer, ChainStore};
pub use graph_memory::GraphMemoryServer;
pub use model::ModelServer;
pub use notebook::NotebookServer;
pub use tasks::{TaskServer, TaskStore};
