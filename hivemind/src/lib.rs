//! # Hivemind
//!
//! A memory-and-reasoning hub: one long-running process that multiplexes
//! MCP clients onto three backends — a property graph store, a markdown
//! notebook vault, and a local model runtime.
//!
//! ## Design principles
//!
//! - **One taxonomy**: every operation resolves to a [`HubError`] kind;
//!   transports map kinds to status codes, envelopes carry them as tags.
//! - **Traits at the seams**: [`GraphStore`] and [`ModelRuntime`] isolate the
//!   drivers; tests and standalone mode run on [`InMemoryGraph`] and
//!   [`MockRuntime`] without touching the network.
//! - **Tools are data**: a sub-server is a name plus a [`ToolRegistry`] of
//!   specs and handlers, not a class hierarchy.
//! - **Governed dispatch**: the [`Dispatcher`] wraps every `tools/call` in
//!   the Omega pipeline — no durable record, no action.
//!
//! ## Main modules
//!
//! - [`graph`]: session pool, entity/relationship CRUD, traversal
//!   ([`GraphPool`], [`Neo4jGraph`], [`InMemoryGraph`]).
//! - [`notebook`]: vault I/O, deterministic frontmatter, daily logs
//!   ([`NotebookVault`], [`Frontmatter`]).
//! - [`model`]: runtime trait, inventory cache, task-class routing
//!   ([`ModelRouter`], [`OllamaRuntime`], [`MockRuntime`]).
//! - [`mcp`]: tool registry, dispatcher, wire protocol ([`ToolRegistry`],
//!   [`Dispatcher`], [`mcp::wire`]).
//! - [`governance`]: the Omega pipeline and log records ([`Omega`],
//!   [`LogRecord`]).
//! - [`servers`]: the five sub-servers (graph-memory, notebook, models,
//!   reasoning-chains, tasks).
//! - [`discovery`]: the ordered sub-server registry ([`SubServerRegistry`]).
//! - [`sinks`]: dispatch observation hooks ([`DispatchSink`]).
//! - [`hub`]: assembly ([`Hub`], [`HubBuilder`]).

pub mod clock;
pub mod discovery;
pub mod error;
pub mod governance;
pub mod graph;
pub mod hub;
pub mod mcp;
pub mod model;
pub mod notebook;
pub mod servers;
pub mod sinks;

pub use discovery::{RegistrationInfo, ServerStatus, SubServerRegistry};
pub use error::{HubError, HubResult};
pub use governance::{LogRecord, Omega, OmegaConfig};
pub use graph::{
    Direction, EntityRef, GraphHealth, GraphPath, GraphPool, GraphPoolSettings, GraphStore,
    InMemoryGraph, Neo4jGraph, PropMap,
};
pub use hub::{Hub, HubBuilder};
pub use mcp::{
    CallToolResult, ContentItem, Dispatcher, ResourceContent, ResourceSpec, SubServer, ToolDef,
    ToolRegistry, ToolSpec,
};
pub use model::{
    ChatRole, ChatTurn, InventoryCache, MockRuntime, ModelEntry, ModelRouter, ModelRuntime,
    OllamaRuntime, RouteOptions, RouteOutcome, RoutingTable, TaskClass, DEFAULT_INVENTORY_TTL,
};
pub use notebook::{FmValue, Frontmatter, ListOrder, NotebookVault};
pub use sinks::{DispatchEvent, DispatchSink, TracingSink};
