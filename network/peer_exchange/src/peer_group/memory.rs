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

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use log::*;

use super::PeerGroup;
use crate::{
    config::PeerGroupConfig,
    peer::{Address, Peer},
};

const LOG_TARGET: &str = "network::peer_exchange::peer_group";

/// A `PeerGroup` held entirely in memory. Reported and persisted peers keep the most recently seen record for each
/// address, and each set is capped at `max_num_stored_peers` by evicting the oldest peers.
#[derive(Debug, Clone)]
pub struct MemoryPeerGroup {
    config: PeerGroupConfig,
    inner: Arc<RwLock<State>>,
}

#[derive(Debug, Default)]
struct State {
    seed_node_addresses: Vec<Address>,
    banned: HashSet<Address>,
    connected: Vec<Peer>,
    reported: HashMap<Address, Peer>,
    persisted: HashMap<Address, Peer>,
}

impl MemoryPeerGroup {
    pub fn new(config: PeerGroupConfig, seed_node_addresses: Vec<Address>) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(State {
                seed_node_addresses,
                ..Default::default()
            })),
        }
    }

    pub fn config(&self) -> &PeerGroupConfig {
        &self.config
    }

    pub fn ban(&self, address: Address) {
        debug!(target: LOG_TARGET, "Banning `{}`", address);
        acquire_write_lock!(self.inner).banned.insert(address);
    }

    pub fn unban(&self, address: &Address) -> bool {
        acquire_write_lock!(self.inner).banned.remove(address)
    }

    /// Replaces the set of connected peers. Called by the transport as connections come and go.
    pub fn set_connected_peers(&self, peers: Vec<Peer>) {
        acquire_write_lock!(self.inner).connected = peers;
    }

    fn merge_newest(store: &mut HashMap<Address, Peer>, peers: Vec<Peer>, max_num_peers: usize) -> usize {
        let mut num_changed = 0;
        for peer in peers {
            match store.get(peer.address()) {
                Some(existing) if existing.created() >= peer.created() => {},
                _ => {
                    store.insert(peer.address().clone(), peer);
                    num_changed += 1;
                },
            }
        }
        Self::evict_oldest(store, max_num_peers);
        num_changed
    }

    fn evict_oldest(store: &mut HashMap<Address, Peer>, max_num_peers: usize) {
        if store.len() <= max_num_peers {
            return;
        }
        let mut peers = store.values().cloned().collect::<Vec<_>>();
        // Newest first
        peers.sort();
        let num_evicted = peers.len() - max_num_peers;
        for peer in peers.into_iter().skip(max_num_peers) {
            store.remove(peer.address());
        }
        debug!(target: LOG_TARGET, "Evicted {} oldest peer(s)", num_evicted);
    }
}

impl PeerGroup for MemoryPeerGroup {
    fn seed_node_addresses(&self) -> Vec<Address> {
        acquire_read_lock!(self.inner).seed_node_addresses.clone()
    }

    fn is_seed(&self, address: &Address) -> bool {
        acquire_read_lock!(self.inner).seed_node_addresses.contains(address)
    }

    fn is_not_banned(&self, address: &Address) -> bool {
        !acquire_read_lock!(self.inner).banned.contains(address)
    }

    fn reported_peers(&self) -> Vec<Peer> {
        acquire_read_lock!(self.inner).reported.values().cloned().collect()
    }

    fn add_reported_peers(&self, peers: Vec<Peer>) {
        let num_changed = Self::merge_newest(
            &mut acquire_write_lock!(self.inner).reported,
            peers,
            self.config.max_num_stored_peers,
        );
        trace!(target: LOG_TARGET, "{} reported peer(s) added or refreshed", num_changed);
    }

    fn clear_reported_peers(&self) {
        acquire_write_lock!(self.inner).reported.clear();
    }

    fn persisted_peers(&self) -> Vec<Peer> {
        acquire_read_lock!(self.inner).persisted.values().cloned().collect()
    }

    fn add_persisted_peers(&self, peers: Vec<Peer>) {
        let num_changed = Self::merge_newest(
            &mut acquire_write_lock!(self.inner).persisted,
            peers,
            self.config.max_num_stored_peers,
        );
        trace!(target: LOG_TARGET, "{} persisted peer(s) added or refreshed", num_changed);
    }

    fn clear_persisted_peers(&self) {
        acquire_write_lock!(self.inner).persisted.clear();
    }

    fn all_connected_peers(&self) -> Vec<Peer> {
        acquire_read_lock!(self.inner).connected.clone()
    }

    fn min_num_connected_peers(&self) -> usize {
        self.config.min_num_connected_peers
    }

    fn target_num_connected_peers(&self) -> usize {
        self.config.target_num_connected_peers()
    }

    fn min_num_reported_peers(&self) -> usize {
        self.config.min_num_reported_peers
    }
}
