//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

mod memory;
pub use memory::MemoryPeerGroup;

use crate::peer::{Address, Peer};

/// Peer group membership: seed nodes, the ban list, connected peers and the reported/persisted peer stores.
///
/// Implementations are shared between concurrent exchange attempts and must synchronise internally.
pub trait PeerGroup: Send + Sync + 'static {
    fn seed_node_addresses(&self) -> Vec<Address>;

    fn is_seed(&self, address: &Address) -> bool;

    fn is_not_banned(&self, address: &Address) -> bool;

    /// Peers learned from other nodes during this session
    fn reported_peers(&self) -> Vec<Peer>;

    fn add_reported_peers(&self, peers: Vec<Peer>);

    fn clear_reported_peers(&self);

    /// Peers loaded from or written to durable storage
    fn persisted_peers(&self) -> Vec<Peer>;

    fn add_persisted_peers(&self, peers: Vec<Peer>);

    fn clear_persisted_peers(&self);

    fn all_connected_peers(&self) -> Vec<Peer>;

    fn min_num_connected_peers(&self) -> usize;

    fn target_num_connected_peers(&self) -> usize;

    fn min_num_reported_peers(&self) -> usize;
}
