//! Hub assembly: wires backends, sub-servers, governance, and the
//! dispatcher into one context object.
//!
//! Nothing here is a global; the transports receive a [`Hub`] by reference
//! and everything inside is reachable from it.

use std::sync::Arc;

use crate::discovery::SubServerRegistry;
use crate::error::HubResult;
use crate::governance::{Omega, OmegaConfig};
use crate::graph::GraphStore;
use crate::mcp::Dispatcher;
use crate::model::ModelRouter;
use crate::notebook::NotebookVault;
use crate::servers::chains::{ChainServer, ChainStore};
use crate::servers::graph_memory::GraphMemoryServer;
use crate::servers::model::ModelServer;
use crate::servers::notebook::NotebookServer;
use crate::servers::tasks::{TaskServer, TaskStore};
use crate::sinks::{DispatchSink, TracingSink};

/// The assembled hub.
pub struct Hub {
    pub graph: Arc<dyn GraphStore>,
    pub vault: Arc<NotebookVault>,
    pub router: Arc<ModelRouter>,
    pub registry: Arc<SubServerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Builder over the three backends.
pub struct HubBuilder {
    graph: Arc<dyn GraphStore>,
    vault: Arc<NotebookVault>,
    router: Arc<ModelRouter>,
    governance: OmegaConfig,
    sinks: Vec<Arc<dyn DispatchSink>>,
}

impl HubBuilder {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vault: Arc<NotebookVault>,
        router: Arc<ModelRouter>,
    ) -> Self {
        Self {
            graph,
            vault,
            router,
            governance: OmegaConfig::default(),
            sinks: vec![Arc::new(TracingSink)],
        }
    }

    pub fn governance(mut self, config: OmegaConfig) -> Self {
        self.governance = config;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Registers the five sub-servers in their canonical order and builds
    /// the dispatcher.
    pub async fn build(self) -> HubResult<Hub> {
        let registry = Arc::new(SubServerRegistry::new());
        registry
            .register(Arc::new(GraphMemoryServer::new(self.graph.clone())))
            .await;
        registry
            .register(Arc::new(NotebookServer::new(self.vault.clone())))
            .await;
        registry
            .register(Arc::new(ModelServer::new(self.router.clone())))
            .await;
        let chain_store = Arc::new(ChainStore::new(self.graph.clone(), self.vault.clone()));
        registry.register(Arc::new(ChainServer::new(chain_store))).await;
        let task_store = Arc::new(TaskStore::new(self.graph.clone()));
        registry.register(Arc::new(TaskServer::new(task_store))).await;

        let omega = Arc::new(Omega::new(self.vault.clone(), self.governance));
        let mut dispatcher = Dispatcher::new(registry.clone(), omega);
        for sink in self.sinks {
            dispatcher = dispatcher.with_sink(sink);
        }
        Ok(Hub {
            graph: self.graph,
            vault: self.vault,
            router: self.router,
            registry,
            dispatcher: Arc::new(dispatcher),
        })
    }
}
