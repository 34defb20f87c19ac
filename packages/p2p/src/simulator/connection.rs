use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    traits::P2PConnection,
    types::{P2PError, P2PResult},
};

use super::{SimulatorNetwork, SimulatorNodeId, no_route};

/// One end of a simulated point-to-point channel.
///
/// Outbound packets travel through the shared [`NetworkGraph`](super::NetworkGraph)
/// and land in the remote node's queue for this node; inbound packets are
/// read from this node's queue for the remote.
#[derive(Debug)]
pub struct SimulatorConnection {
    local_id: SimulatorNodeId,
    remote_id: SimulatorNodeId,
    network: SimulatorNetwork,
    connected: AtomicBool,
}

/// A packet that holds a delivery ticket while it is in flight.
///
/// Dropping it before [`Self::deliver`] (e.g. because the sending future was
/// cancelled) releases the ticket so later packets are not held back.
struct PendingDelivery<'a> {
    network: &'a SimulatorNetwork,
    from: &'a SimulatorNodeId,
    to: &'a SimulatorNodeId,
    ticket: Option<u64>,
}

impl PendingDelivery<'_> {
    fn resolve(&mut self, payload: Option<Vec<u8>>) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let Ok(mut graph) = self.network.write() else {
            log::error!("resolve: network graph lock poisoned");
            return;
        };
        match graph.get_node_mut(self.to) {
            Ok(node) => node.queue_mut(self.from).resolve(ticket, payload),
            Err(e) => log::debug!("resolve: dropping packet: {e}"),
        }
    }

    fn deliver(mut self, payload: Vec<u8>) {
        self.resolve(Some(payload));
    }
}

impl Drop for PendingDelivery<'_> {
    fn drop(&mut self) {
        if self.ticket.is_some() {
            log::trace!(
                "PendingDelivery::drop: releasing ticket {} -> {}",
                self.from.fmt_short(),
                self.to.fmt_short()
            );
            self.resolve(None);
        }
    }
}

impl SimulatorConnection {
    pub(crate) const fn new(
        local_id: SimulatorNodeId,
        remote_id: SimulatorNodeId,
        network: SimulatorNetwork,
    ) -> Self {
        Self {
            local_id,
            remote_id,
            network,
            connected: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub const fn local_node_id(&self) -> &SimulatorNodeId {
        &self.local_id
    }

    /// Pops the oldest delivered message without waiting. `Ok(None)` means no
    /// message is available yet.
    ///
    /// # Errors
    ///
    /// * If the connection is closed and its queue is drained
    /// * If the local node was removed from the network
    pub fn try_recv(&self) -> P2PResult<Option<Vec<u8>>> {
        let mut graph = self.network.write()?;
        let queue = graph.get_node_mut(&self.local_id)?.queue_mut(&self.remote_id);

        match queue.pop() {
            Some(message) => Ok(Some(message)),
            None if !self.is_connected() => Err(P2PError::ConnectionClosed),
            None => Ok(None),
        }
    }

    async fn wait_for_message(&self) -> P2PResult<Vec<u8>> {
        loop {
            let notify = {
                let mut graph = self.network.write()?;
                let queue = graph.get_node_mut(&self.local_id)?.queue_mut(&self.remote_id);
                if let Some(message) = queue.pop() {
                    return Ok(message);
                }
                if !self.is_connected() {
                    return Err(P2PError::ConnectionClosed);
                }
                queue.notify()
            };

            notify.notified().await;
        }
    }
}

impl P2PConnection for SimulatorConnection {
    type NodeId = SimulatorNodeId;

    async fn send(&mut self, data: &[u8]) -> P2PResult<()> {
        if !self.is_connected() {
            return Err(P2PError::ConnectionClosed);
        }

        let max = self.network.config().max_message_size;
        if data.len() > max {
            return Err(P2PError::MessageTooLarge {
                size: data.len(),
                max,
            });
        }

        let (delay, ticket) = {
            let mut graph = self.network.write()?;
            let route = graph
                .route(&self.local_id, &self.remote_id, data.len())
                .ok_or_else(|| no_route(&self.local_id, &self.remote_id))?;

            let ticket = if route.dropped {
                None
            } else {
                Some(
                    graph
                        .get_node_mut(&self.remote_id)?
                        .queue_mut(&self.local_id)
                        .reserve(),
                )
            };

            (route.delay, ticket)
        };

        let pending = PendingDelivery {
            network: &self.network,
            from: &self.local_id,
            to: &self.remote_id,
            ticket,
        };

        tokio::time::sleep(delay).await;

        if pending.ticket.is_some() {
            pending.deliver(data.to_vec());
        } else {
            log::trace!(
                "send: packet lost {} -> {} len={}",
                self.local_id.fmt_short(),
                self.remote_id.fmt_short(),
                data.len()
            );
        }

        Ok(())
    }

    async fn recv(&mut self) -> P2PResult<Vec<u8>> {
        let timeout = self.network.config().connection_timeout;

        tokio::time::timeout(timeout, self.wait_for_message())
            .await
            .map_err(|_| {
                P2PError::Timeout(format!(
                    "no message from {} within {timeout:?}",
                    self.remote_id.fmt_short()
                ))
            })?
    }

    fn close(&mut self) -> P2PResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            log::debug!(
                "close: {} -> {}",
                self.local_id.fmt_short(),
                self.remote_id.fmt_short()
            );
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn remote_node_id(&self) -> &SimulatorNodeId {
        &self.remote_id
    }
}
