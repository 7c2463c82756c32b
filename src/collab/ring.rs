use crate::collab::peer::Peer;
use sha2::{Digest, Sha256};

pub type NodeDigest = u64;

/// Places a node name on the ring: the first 8 bytes of its SHA-256, big endian.
pub fn node_digest(node_name: &str) -> NodeDigest {
    let hash = Sha256::digest(node_name.as_bytes());

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);

    NodeDigest::from_be_bytes(prefix)
}

/// Chooses the peers this node has to check.
///
/// Peer digests form a ring that wraps from `u64::MAX` back to 0. Starting at our own
/// digest (which is not itself on the ring) we walk clockwise and take the first `limit`
/// peers, returned in ring order.
///
/// Every node's window has the same size, so every node falls into exactly `limit` windows
/// of other nodes. The inbound check volume of a peer therefore stays at `limit` no matter
/// how large the cluster gets.
///
/// A `limit` of 0, or one covering every listed peer, returns all peers except ourselves in
/// discovery order.
//
// Implementation
// Sort once, binary search the anchor, then walk `limit` entries with wraparound:
// O(N log N) overall, O(log N + K) once sorted.
//
pub fn select_neighbours(node_name: &str, peers: &[Peer], limit: usize) -> Vec<Peer> {
    let mut ring: Vec<&Peer> = peers.iter().filter(|p| p.node_name != node_name).collect();

    if limit == 0 || limit >= peers.len() {
        return ring.into_iter().cloned().collect();
    }

    let own_digest = node_digest(node_name);

    // Stable: colliding digests keep their discovery order
    ring.sort_by_key(|p| p.node_hash);

    let anchor = ring.partition_point(|p| p.node_hash < own_digest);

    ring.iter()
        .cycle()
        .skip(anchor)
        .take(limit.min(ring.len()))
        .map(|p| (*p).clone())
        .collect()
}
