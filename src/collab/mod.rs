//! How agents find each other and split the peer checks between themselves.
//!
//! Each agent discovers the whole neighbourhood but only checks a bounded, ring-selected
//! subset of it, so the cluster runs O(N * K) peer checks instead of O(N²).

pub mod discovery;
pub mod peer;
pub mod ring;

pub use discovery::{KubernetesPeerProvider, PeerProvider};
pub use peer::{NodePhase, Peer};
pub use ring::select_neighbours;
