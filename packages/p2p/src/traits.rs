//! Backend-agnostic P2P capability traits.
//!
//! Every backend (the in-process simulator, a production transport) provides
//! one type per trait. Application code written against these traits runs
//! unmodified on any backend; the associated types tie a connection and
//! listener to the node id type of the system that produced them.
//!
//! The async operations return `impl Future + Send` so calls are statically
//! dispatched with no boxing.

use std::{
    fmt::{Debug, Display},
    future::Future,
    hash::Hash,
};

use crate::types::P2PResult;

/// Identity of a participant in the network.
pub trait P2PNodeId:
    Clone + Debug + Display + PartialEq + Eq + PartialOrd + Ord + Hash + Send + Sync + 'static
{
    /// Deterministically derives an id from `seed`. The same seed yields the
    /// same id across process runs.
    fn from_seed(seed: &str) -> Self;

    /// # Errors
    ///
    /// * If `bytes` is not a well-formed key for this backend
    fn from_bytes(bytes: &[u8; 32]) -> P2PResult<Self>;

    fn as_bytes(&self) -> &[u8; 32];

    /// Exactly 10 characters, identical in format across backends.
    fn fmt_short(&self) -> String;
}

/// A point-to-point channel to a single remote node.
pub trait P2PConnection: Send + Sync {
    type NodeId: P2PNodeId;

    /// Sends `data` to the remote node. A packet dropped by the network is
    /// still a successful send.
    ///
    /// # Errors
    ///
    /// * If the connection was closed
    /// * If `data` exceeds the maximum message size
    /// * If there is no route to the remote node
    fn send(&mut self, data: &[u8]) -> impl Future<Output = P2PResult<()>> + Send;

    /// Waits for the next message from the remote node.
    ///
    /// # Errors
    ///
    /// * If no message arrives before the backend's timeout
    /// * If the connection is closed and no queued data remains
    fn recv(&mut self) -> impl Future<Output = P2PResult<Vec<u8>>> + Send;

    /// # Errors
    ///
    /// * If the backend fails to tear down the connection
    fn close(&mut self) -> P2PResult<()>;

    fn is_connected(&self) -> bool;

    fn remote_node_id(&self) -> &Self::NodeId;
}

/// Accepts connections dialed by remote nodes.
pub trait P2PListener: Send + Sync {
    type Connection: P2PConnection;

    /// Waits for the next inbound connection.
    ///
    /// # Errors
    ///
    /// * If no connection arrives before the backend's timeout
    fn accept(&mut self) -> impl Future<Output = P2PResult<Self::Connection>> + Send;

    fn local_addr(&self) -> &str;
}

/// Entry point of a backend.
pub trait P2PSystem: Send + Sync {
    type NodeId: P2PNodeId;
    type Connection: P2PConnection<NodeId = Self::NodeId>;
    type Listener: P2PListener<Connection = Self::Connection>;

    /// # Errors
    ///
    /// * If the node is unknown or unreachable
    fn connect(
        &self,
        node_id: Self::NodeId,
    ) -> impl Future<Output = P2PResult<Self::Connection>> + Send;

    /// # Errors
    ///
    /// * If the address is invalid or already in use
    fn listen(&self, addr: &str) -> impl Future<Output = P2PResult<Self::Listener>> + Send;

    /// Resolves a registered name to a node id.
    ///
    /// # Errors
    ///
    /// * If no node registered `name`, or the backend has no registry
    fn discover(&self, name: &str) -> impl Future<Output = P2PResult<Self::NodeId>> + Send;

    fn local_node_id(&self) -> &Self::NodeId;

    /// Resolves `name` and connects to the resulting node.
    ///
    /// # Errors
    ///
    /// * If discovery or the subsequent connect fails
    fn connect_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = P2PResult<Self::Connection>> + Send {
        async move {
            let node_id = self.discover(name).await?;
            self.connect(node_id).await
        }
    }
}
