use crate::{
    traits::P2PListener,
    types::{P2PError, P2PResult},
};

use super::{SimulatorConnection, SimulatorNetwork, SimulatorNodeId};

/// Accepts connections dialed to the owning node.
///
/// The address is released when the listener is dropped.
#[derive(Debug)]
pub struct SimulatorListener {
    node_id: SimulatorNodeId,
    addr: String,
    network: SimulatorNetwork,
}

impl SimulatorListener {
    pub(crate) const fn new(
        node_id: SimulatorNodeId,
        addr: String,
        network: SimulatorNetwork,
    ) -> Self {
        Self {
            node_id,
            addr,
            network,
        }
    }

    async fn wait_for_peer(&self) -> P2PResult<SimulatorConnection> {
        loop {
            let notify = {
                let mut graph = self.network.write()?;
                let node = graph.get_node_mut(&self.node_id)?;
                if let Some(peer) = node.pop_pending_accept() {
                    log::debug!(
                        "accept: {} <- {} on {}",
                        self.node_id.fmt_short(),
                        peer.fmt_short(),
                        self.addr
                    );
                    return Ok(SimulatorConnection::new(
                        self.node_id.clone(),
                        peer,
                        self.network.clone(),
                    ));
                }
                node.accept_notify()
            };

            notify.notified().await;
        }
    }
}

impl P2PListener for SimulatorListener {
    type Connection = SimulatorConnection;

    async fn accept(&mut self) -> P2PResult<SimulatorConnection> {
        let timeout = self.network.config().connection_timeout;

        tokio::time::timeout(timeout, self.wait_for_peer())
            .await
            .map_err(|_| {
                P2PError::Timeout(format!(
                    "no inbound connection on {} within {timeout:?}",
                    self.addr
                ))
            })?
    }

    fn local_addr(&self) -> &str {
        &self.addr
    }
}

impl Drop for SimulatorListener {
    fn drop(&mut self) {
        if let Ok(mut graph) = self.network.write() {
            graph.unbind_listener(&self.node_id, &self.addr);
        }
    }
}
