use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use rand::{Rng as _, SeedableRng as _, rngs::StdRng};
use tokio::sync::Notify;

use crate::{
    config::{SimulatorConfig, validate_packet_loss},
    types::{P2PError, P2PResult},
};

use super::SimulatorNodeId;

/// Topology and per-node state of one simulated network.
///
/// Links are stored once per direction. Path finding only follows active
/// links between online nodes.
#[derive(Debug)]
pub struct NetworkGraph {
    nodes: BTreeMap<SimulatorNodeId, NodeInfo>,
    links: BTreeMap<(SimulatorNodeId, SimulatorNodeId), LinkInfo>,
    default_link: LinkInfo,
    rng: StdRng,
}

#[derive(Debug)]
pub struct NodeInfo {
    id: SimulatorNodeId,
    is_online: bool,
    registered_names: BTreeMap<String, String>, // For DNS-like discovery
    message_queues: BTreeMap<SimulatorNodeId, InboundQueue>,
    pending_accepts: VecDeque<SimulatorNodeId>,
    accept_notify: Arc<Notify>,
    listen_addrs: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub latency: Duration,
    pub packet_loss: f64,
    pub bandwidth_limit: Option<u64>, // bytes per second
    pub is_active: bool,
}

/// Messages from one peer waiting to be received by the queue's owner.
///
/// Every in-flight packet holds a ticket. Payloads become visible strictly in
/// ticket order, so a fast packet never overtakes a slower one sent earlier
/// on the same directed pair.
#[derive(Debug, Default)]
pub struct InboundQueue {
    messages: VecDeque<Vec<u8>>,
    next_ticket: u64,
    next_release: u64,
    in_flight: BTreeMap<u64, Option<Vec<u8>>>,
    notify: Arc<Notify>,
}

/// Outcome of routing one packet through the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub path: Vec<SimulatorNodeId>,
    pub delay: Duration,
    pub dropped: bool,
}

impl LinkInfo {
    #[must_use]
    pub const fn new(latency: Duration, packet_loss: f64) -> Self {
        Self {
            latency,
            packet_loss,
            bandwidth_limit: None,
            is_active: true,
        }
    }

    /// A lossless link with the given latency
    #[must_use]
    pub const fn lossless(latency: Duration) -> Self {
        Self::new(latency, 0.0)
    }

    #[must_use]
    pub const fn with_bandwidth_limit(mut self, bytes_per_second: u64) -> Self {
        self.bandwidth_limit = Some(bytes_per_second);
        self
    }

    /// Propagation latency plus the time to push `len` bytes through the
    /// bandwidth ceiling, if any. Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn transit_time(&self, len: usize) -> Duration {
        match self.bandwidth_limit {
            Some(0) | None => self.latency,
            #[allow(clippy::cast_precision_loss)]
            Some(limit) => self.latency.saturating_add(
                Duration::try_from_secs_f64(len as f64 / limit as f64).unwrap_or(Duration::MAX),
            ),
        }
    }
}

impl InboundQueue {
    /// Reserves the delivery position of a packet about to be sent.
    pub const fn reserve(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Completes the packet holding `ticket`. `None` releases the slot
    /// without delivering anything.
    pub fn resolve(&mut self, ticket: u64, payload: Option<Vec<u8>>) {
        self.in_flight.insert(ticket, payload);

        let mut delivered = false;
        while let Some(entry) = self.in_flight.remove(&self.next_release) {
            self.next_release += 1;
            if let Some(payload) = entry {
                self.messages.push_back(payload);
                delivered = true;
            }
        }

        if delivered {
            self.notify.notify_one();
        }
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.messages.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

impl NodeInfo {
    fn new(id: SimulatorNodeId) -> Self {
        Self {
            id,
            is_online: true,
            registered_names: BTreeMap::new(),
            message_queues: BTreeMap::new(),
            pending_accepts: VecDeque::new(),
            accept_notify: Arc::new(Notify::new()),
            listen_addrs: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &SimulatorNodeId {
        &self.id
    }

    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.is_online
    }

    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.registered_names.contains_key(name)
    }

    #[must_use]
    pub fn registered_names(&self) -> impl Iterator<Item = &str> {
        self.registered_names.keys().map(String::as_str)
    }

    /// Inbound queue holding messages sent by `peer`, created on first use.
    pub fn queue_mut(&mut self, peer: &SimulatorNodeId) -> &mut InboundQueue {
        self.message_queues.entry(peer.clone()).or_default()
    }

    #[must_use]
    pub fn queue(&self, peer: &SimulatorNodeId) -> Option<&InboundQueue> {
        self.message_queues.get(peer)
    }

    pub fn pop_pending_accept(&mut self) -> Option<SimulatorNodeId> {
        self.pending_accepts.pop_front()
    }

    #[must_use]
    pub fn accept_notify(&self) -> Arc<Notify> {
        self.accept_notify.clone()
    }

    #[must_use]
    pub fn pending_accept_count(&self) -> usize {
        self.pending_accepts.len()
    }

    #[must_use]
    pub fn is_listening_on(&self, addr: &str) -> bool {
        self.listen_addrs.contains(addr)
    }
}

impl NetworkGraph {
    /// # Errors
    ///
    /// * If the configuration is invalid
    pub fn new(config: &SimulatorConfig) -> P2PResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// Builds the graph from a configuration that already passed
    /// [`SimulatorConfig::validate`].
    pub(crate) fn from_valid_config(config: &SimulatorConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            default_link: LinkInfo::new(config.default_latency, config.default_packet_loss),
            rng: config
                .seed
                .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64),
        }
    }

    #[must_use]
    pub const fn default_link(&self) -> &LinkInfo {
        &self.default_link
    }

    /// Adds `node_id` to the graph. Existing nodes keep their state.
    pub fn add_node(&mut self, node_id: SimulatorNodeId) {
        if !self.nodes.contains_key(&node_id) {
            log::debug!("add_node: node_id={}", node_id.fmt_short());
            self.nodes.insert(node_id.clone(), NodeInfo::new(node_id));
        }
    }

    /// Removes the node and every link touching it. Returns whether the node
    /// existed.
    pub fn remove_node(&mut self, node_id: &SimulatorNodeId) -> bool {
        self.links.retain(|(a, b), _| a != node_id && b != node_id);
        self.nodes.remove(node_id).is_some()
    }

    #[must_use]
    pub fn contains_node(&self, node_id: &SimulatorNodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// # Errors
    ///
    /// * If the link's packet loss is not a probability
    pub fn connect_nodes(
        &mut self,
        a: SimulatorNodeId,
        b: SimulatorNodeId,
        link: LinkInfo,
    ) -> P2PResult<()> {
        self.connect_nodes_directed(b.clone(), a.clone(), link.clone())?;
        self.connect_nodes_directed(a, b, link)
    }

    /// Installs the link for traffic from `from` to `to` only.
    ///
    /// # Errors
    ///
    /// * If the link's packet loss is not a probability
    pub fn connect_nodes_directed(
        &mut self,
        from: SimulatorNodeId,
        to: SimulatorNodeId,
        link: LinkInfo,
    ) -> P2PResult<()> {
        validate_packet_loss(link.packet_loss)?;
        log::debug!(
            "connect_nodes: {} -> {} link={link:?}",
            from.fmt_short(),
            to.fmt_short()
        );
        self.add_node(from.clone());
        self.add_node(to.clone());
        self.links.insert((from, to), link);
        Ok(())
    }

    /// Removes both directions of the link between `a` and `b`.
    pub fn remove_link(&mut self, a: &SimulatorNodeId, b: &SimulatorNodeId) {
        self.links.remove(&(a.clone(), b.clone()));
        self.links.remove(&(b.clone(), a.clone()));
    }

    /// Toggles both directions of the link while keeping its conditions.
    pub fn set_link_active(&mut self, a: &SimulatorNodeId, b: &SimulatorNodeId, active: bool) {
        for key in [(a.clone(), b.clone()), (b.clone(), a.clone())] {
            if let Some(link) = self.links.get_mut(&key) {
                link.is_active = active;
            }
        }
    }

    #[must_use]
    pub fn link(&self, from: &SimulatorNodeId, to: &SimulatorNodeId) -> Option<&LinkInfo> {
        self.links.get(&(from.clone(), to.clone()))
    }

    fn is_routable(&self, node_id: &SimulatorNodeId) -> bool {
        self.nodes.get(node_id).is_some_and(NodeInfo::is_online)
    }

    fn neighbors<'a>(
        &'a self,
        node_id: &'a SimulatorNodeId,
    ) -> impl Iterator<Item = &'a SimulatorNodeId> + 'a {
        let start = (node_id.clone(), SimulatorNodeId::new([0u8; 32]));
        self.links
            .range(start..)
            .take_while(move |((from, _), _)| from == node_id)
            .filter(|(_, link)| link.is_active)
            .map(|((_, to), _)| to)
    }

    /// Shortest hop-count path over active links between online nodes.
    ///
    /// Neighbors are visited in id order, so among equally short paths the
    /// result is deterministic.
    #[must_use]
    pub fn find_path(
        &self,
        from: &SimulatorNodeId,
        to: &SimulatorNodeId,
    ) -> Option<Vec<SimulatorNodeId>> {
        if !self.is_routable(from) || !self.is_routable(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.clone()]);
        }

        let mut queue = VecDeque::new();
        let mut parent: BTreeMap<&SimulatorNodeId, &SimulatorNodeId> = BTreeMap::new();

        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if next == from || parent.contains_key(next) || !self.is_routable(next) {
                    continue;
                }
                parent.insert(next, current);

                if next == to {
                    let mut path = vec![to.clone()];
                    let mut node = to;
                    while let Some(prev) = parent.get(node) {
                        path.push((*prev).clone());
                        node = *prev;
                    }
                    path.reverse();
                    return Some(path);
                }

                queue.push_back(next);
            }
        }

        None // No path found
    }

    /// Routes a packet of `len` bytes, sampling loss independently on every
    /// hop. Returns `None` when no path exists.
    pub fn route(
        &mut self,
        from: &SimulatorNodeId,
        to: &SimulatorNodeId,
        len: usize,
    ) -> Option<Route> {
        let path = self.find_path(from, to)?;
        let mut delay = Duration::ZERO;
        let mut dropped = false;

        for hop in path.windows(2) {
            let link = self.links.get(&(hop[0].clone(), hop[1].clone()))?;
            delay = delay.saturating_add(link.transit_time(len));
            if link.packet_loss > 0.0 && self.rng.random_bool(link.packet_loss) {
                dropped = true;
            }
        }

        log::trace!(
            "route: {} -> {} hops={} delay={delay:?} dropped={dropped}",
            from.fmt_short(),
            to.fmt_short(),
            path.len() - 1,
        );

        Some(Route {
            path,
            delay,
            dropped,
        })
    }

    /// Removes every link between the two groups, in both directions.
    pub fn add_partition(&mut self, group_a: &[SimulatorNodeId], group_b: &[SimulatorNodeId]) {
        log::debug!(
            "add_partition: group_a={} group_b={}",
            group_a.len(),
            group_b.len()
        );
        for a in group_a {
            for b in group_b {
                self.remove_link(a, b);
            }
        }
    }

    /// Connects every pair across the two groups with the default link.
    /// Conditions that existed before a partition are not restored.
    pub fn heal_partition(&mut self, group_a: &[SimulatorNodeId], group_b: &[SimulatorNodeId]) {
        log::debug!(
            "heal_partition: group_a={} group_b={}",
            group_a.len(),
            group_b.len()
        );
        let default_link = self.default_link.clone();

        for a in group_a {
            for b in group_b {
                self.add_node(a.clone());
                self.add_node(b.clone());
                self.links
                    .insert((a.clone(), b.clone()), default_link.clone());
                self.links
                    .insert((b.clone(), a.clone()), default_link.clone());
            }
        }
    }

    /// # Errors
    ///
    /// * If the node is not part of the graph
    pub fn set_node_online(&mut self, node_id: &SimulatorNodeId, online: bool) -> P2PResult<()> {
        let node = self.get_node_mut(node_id)?;
        log::debug!(
            "set_node_online: node_id={} online={online}",
            node_id.fmt_short()
        );
        node.is_online = online;
        Ok(())
    }

    /// # Errors
    ///
    /// * If the node is not part of the graph
    pub fn get_node_mut(&mut self, node_id: &SimulatorNodeId) -> P2PResult<&mut NodeInfo> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| P2PError::NodeNotFound(node_id.fmt_short()))
    }

    /// # Errors
    ///
    /// * If the node is not part of the graph
    pub fn get_node(&self, node_id: &SimulatorNodeId) -> P2PResult<&NodeInfo> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| P2PError::NodeNotFound(node_id.fmt_short()))
    }

    /// Creates the inbound queues for both directions between `a` and `b`.
    ///
    /// # Errors
    ///
    /// * If either node is not part of the graph
    pub fn open_queues(&mut self, a: &SimulatorNodeId, b: &SimulatorNodeId) -> P2PResult<()> {
        self.get_node_mut(a)?.queue_mut(b);
        self.get_node_mut(b)?.queue_mut(a);
        Ok(())
    }

    /// Records that `from` dialed `to` and wakes a listener on `to`. Nothing
    /// is recorded while `to` has no bound address.
    ///
    /// # Errors
    ///
    /// * If `to` is not part of the graph
    pub fn push_pending_accept(
        &mut self,
        to: &SimulatorNodeId,
        from: SimulatorNodeId,
    ) -> P2PResult<()> {
        let node = self.get_node_mut(to)?;
        if node.listen_addrs.is_empty() {
            return Ok(());
        }
        node.pending_accepts.push_back(from);
        node.accept_notify.notify_one();
        Ok(())
    }

    /// # Errors
    ///
    /// * If the node is not part of the graph
    /// * If the node already listens on `addr`
    pub fn bind_listener(&mut self, node_id: &SimulatorNodeId, addr: &str) -> P2PResult<()> {
        let node = self.get_node_mut(node_id)?;
        if !node.listen_addrs.insert(addr.to_string()) {
            return Err(P2PError::ConnectionFailed(format!(
                "{} already listening on {addr}",
                node_id.fmt_short()
            )));
        }
        Ok(())
    }

    /// Releases `addr`. Releasing the last address discards the connects
    /// nobody accepted.
    pub fn unbind_listener(&mut self, node_id: &SimulatorNodeId, addr: &str) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.listen_addrs.remove(addr);
            if node.listen_addrs.is_empty() {
                node.pending_accepts.clear();
            }
        }
    }

    /// Attaches `name` to the record of `node_id`.
    ///
    /// # Errors
    ///
    /// * If the node is not part of the graph
    pub fn register_name(&mut self, name: &str, node_id: &SimulatorNodeId) -> P2PResult<()> {
        let canonical = node_id.to_string();
        self.get_node_mut(node_id)?
            .registered_names
            .insert(name.to_string(), canonical);
        Ok(())
    }

    /// Returns whether the name was registered on the node.
    pub fn unregister_name(&mut self, name: &str, node_id: &SimulatorNodeId) -> bool {
        self.nodes
            .get_mut(node_id)
            .is_some_and(|node| node.registered_names.remove(name).is_some())
    }

    /// First node, in id order, that registered `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&SimulatorNodeId> {
        self.nodes
            .values()
            .find(|node| node.has_name(name))
            .map(NodeInfo::id)
    }
}
