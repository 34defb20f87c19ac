//! Deterministic in-process P2P network simulator.
//!
//! A [`SimulatorNetwork`] owns one [`NetworkGraph`] behind a lock. Every
//! [`SimulatorP2P`] system, connection and listener created from it holds a
//! handle to that graph, so topology changes are visible to all of them at
//! once.
//!
//! Link latency is modeled with `tokio::time::sleep`. Tests that run on a
//! paused tokio clock advance through it without waiting on the wall clock.

mod connection;
mod graph;
mod listener;
mod node_id;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use connection::SimulatorConnection;
pub use graph::{InboundQueue, LinkInfo, NetworkGraph, NodeInfo, Route};
pub use listener::SimulatorListener;
pub use node_id::{SimulatorNodeId, test_node_id};

use crate::{
    config::SimulatorConfig,
    traits::P2PSystem,
    types::{P2PError, P2PResult},
};

pub(crate) fn no_route(from: &SimulatorNodeId, to: &SimulatorNodeId) -> P2PError {
    P2PError::NoRoute {
        from: from.fmt_short(),
        to: to.fmt_short(),
    }
}

/// Shared handle to one simulated network.
#[derive(Debug, Clone)]
pub struct SimulatorNetwork {
    graph: Arc<RwLock<NetworkGraph>>,
    config: Arc<SimulatorConfig>,
}

impl Default for SimulatorNetwork {
    fn default() -> Self {
        Self::from_graph(SimulatorConfig::default(), |_| {})
    }
}

impl SimulatorNetwork {
    /// # Errors
    ///
    /// * If the configuration is invalid
    pub fn new(config: SimulatorConfig) -> P2PResult<Self> {
        config.validate()?;
        Ok(Self::from_graph(config, |_| {}))
    }

    /// Creates a network configured from the `SIMULATOR_*` environment
    /// variables.
    ///
    /// # Errors
    ///
    /// * If any of the variables is malformed
    pub fn from_env() -> P2PResult<Self> {
        Self::new(SimulatorConfig::from_env()?)
    }

    fn from_graph(config: SimulatorConfig, init: impl FnOnce(&mut NetworkGraph)) -> Self {
        let mut graph = NetworkGraph::from_valid_config(&config);
        init(&mut graph);
        Self {
            graph: Arc::new(RwLock::new(graph)),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn read(&self) -> P2PResult<RwLockReadGuard<'_, NetworkGraph>> {
        self.graph
            .read()
            .map_err(|e| P2PError::NetworkError(format!("network graph lock poisoned: {e}")))
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn write(&self) -> P2PResult<RwLockWriteGuard<'_, NetworkGraph>> {
        self.graph
            .write()
            .map_err(|e| P2PError::NetworkError(format!("network graph lock poisoned: {e}")))
    }

    /// Adds a node derived from `seed` and returns its system.
    ///
    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn node(&self, seed: &str) -> P2PResult<SimulatorP2P> {
        SimulatorP2P::join(self, SimulatorNodeId::from_seed(seed))
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn add_node(&self, node_id: SimulatorNodeId) -> P2PResult<()> {
        self.write()?.add_node(node_id);
        Ok(())
    }

    /// Links `a` and `b` in both directions with the default conditions.
    ///
    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn connect_nodes(&self, a: &SimulatorNodeId, b: &SimulatorNodeId) -> P2PResult<()> {
        let mut graph = self.write()?;
        let link = graph.default_link().clone();
        graph.connect_nodes(a.clone(), b.clone(), link)
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    /// * If the link's packet loss is not a probability
    pub fn connect_nodes_with(
        &self,
        a: &SimulatorNodeId,
        b: &SimulatorNodeId,
        link: LinkInfo,
    ) -> P2PResult<()> {
        self.write()?.connect_nodes(a.clone(), b.clone(), link)
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    /// * If the link's packet loss is not a probability
    pub fn connect_nodes_directed(
        &self,
        from: &SimulatorNodeId,
        to: &SimulatorNodeId,
        link: LinkInfo,
    ) -> P2PResult<()> {
        self.write()?
            .connect_nodes_directed(from.clone(), to.clone(), link)
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn remove_link(&self, a: &SimulatorNodeId, b: &SimulatorNodeId) -> P2PResult<()> {
        self.write()?.remove_link(a, b);
        Ok(())
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn add_partition(
        &self,
        group_a: &[SimulatorNodeId],
        group_b: &[SimulatorNodeId],
    ) -> P2PResult<()> {
        self.write()?.add_partition(group_a, group_b);
        Ok(())
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn heal_partition(
        &self,
        group_a: &[SimulatorNodeId],
        group_b: &[SimulatorNodeId],
    ) -> P2PResult<()> {
        self.write()?.heal_partition(group_a, group_b);
        Ok(())
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    /// * If the node is not part of the network
    pub fn set_node_online(&self, node_id: &SimulatorNodeId, online: bool) -> P2PResult<()> {
        self.write()?.set_node_online(node_id, online)
    }

    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn find_path(
        &self,
        from: &SimulatorNodeId,
        to: &SimulatorNodeId,
    ) -> P2PResult<Option<Vec<SimulatorNodeId>>> {
        Ok(self.read()?.find_path(from, to))
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorP2P {
    node_id: SimulatorNodeId,
    network: SimulatorNetwork,
}

impl SimulatorP2P {
    /// Create a new simulator P2P instance with random node ID on its own
    /// network
    #[must_use]
    pub fn new() -> Self {
        Self::standalone(SimulatorNodeId::generate())
    }

    /// Create a simulator P2P instance with deterministic node ID (for testing)
    /// on its own network
    #[must_use]
    pub fn with_seed(seed: &str) -> Self {
        Self::standalone(SimulatorNodeId::from_seed(seed))
    }

    fn standalone(node_id: SimulatorNodeId) -> Self {
        let network = SimulatorNetwork::from_graph(SimulatorConfig::default(), |graph| {
            graph.add_node(node_id.clone());
        });
        Self { node_id, network }
    }

    /// Adds `node_id` to `network` and returns a system acting as that node.
    ///
    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn join(network: &SimulatorNetwork, node_id: SimulatorNodeId) -> P2PResult<Self> {
        network.add_node(node_id.clone())?;
        Ok(Self {
            node_id,
            network: network.clone(),
        })
    }

    /// Get this node's ID
    #[must_use]
    pub const fn local_node_id(&self) -> &SimulatorNodeId {
        &self.node_id
    }

    #[must_use]
    pub const fn network(&self) -> &SimulatorNetwork {
        &self.network
    }

    /// Registers `name` for `node_id` so that [`P2PSystem::discover`] can
    /// resolve it.
    ///
    /// Names are not unique across nodes. When several nodes register the
    /// same name, discovery resolves to the node with the smallest id.
    ///
    /// # Errors
    ///
    /// * If the graph lock is poisoned
    /// * If `node_id` is not part of the network
    pub fn register_peer(&self, name: &str, node_id: &SimulatorNodeId) -> P2PResult<()> {
        log::debug!("register_peer: name={name} node_id={}", node_id.fmt_short());

        self.network.write()?.register_name(name, node_id)
    }

    /// Returns whether `name` was registered for `node_id`.
    ///
    /// # Errors
    ///
    /// * If the graph lock is poisoned
    pub fn unregister_peer(&self, name: &str, node_id: &SimulatorNodeId) -> P2PResult<bool> {
        Ok(self.network.write()?.unregister_name(name, node_id))
    }
}

impl Default for SimulatorP2P {
    fn default() -> Self {
        Self::new()
    }
}

impl P2PSystem for SimulatorP2P {
    type NodeId = SimulatorNodeId;
    type Connection = SimulatorConnection;
    type Listener = SimulatorListener;

    async fn connect(&self, node_id: SimulatorNodeId) -> P2PResult<SimulatorConnection> {
        {
            let mut graph = self.network.write()?;
            graph.get_node(&node_id)?;
            if graph.find_path(&self.node_id, &node_id).is_none() {
                return Err(no_route(&self.node_id, &node_id));
            }
            graph.open_queues(&self.node_id, &node_id)?;
            graph.push_pending_accept(&node_id, self.node_id.clone())?;
        }

        log::debug!(
            "connect: {} -> {}",
            self.node_id.fmt_short(),
            node_id.fmt_short()
        );

        Ok(SimulatorConnection::new(
            self.node_id.clone(),
            node_id,
            self.network.clone(),
        ))
    }

    async fn listen(&self, addr: &str) -> P2PResult<SimulatorListener> {
        if addr.trim().is_empty() {
            return Err(P2PError::InvalidConfiguration(
                "listen address must not be empty".to_string(),
            ));
        }

        self.network.write()?.bind_listener(&self.node_id, addr)?;
        log::debug!("listen: node_id={} addr={addr}", self.node_id.fmt_short());

        Ok(SimulatorListener::new(
            self.node_id.clone(),
            addr.to_string(),
            self.network.clone(),
        ))
    }

    async fn discover(&self, name: &str) -> P2PResult<SimulatorNodeId> {
        tokio::time::sleep(self.network.config().discovery_delay).await;

        let found = self.network.read()?.find_by_name(name).cloned();
        log::debug!(
            "discover: name={name} found={:?}",
            found.as_ref().map(SimulatorNodeId::fmt_short)
        );

        found.ok_or_else(|| P2PError::DiscoveryFailed(format!("no node registered {name:?}")))
    }

    fn local_node_id(&self) -> &SimulatorNodeId {
        &self.node_id
    }
}
