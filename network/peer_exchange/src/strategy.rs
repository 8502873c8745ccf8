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

//! Candidate selection and peer bookkeeping for the peer exchange.
//!
//! The strategy decides which addresses to exchange with and which peers to report, and merges peers reported by
//! other nodes into the peer group. It holds the set of addresses already used in this bootstrap session so that
//! consecutive rounds prefer addresses that have not been tried yet.

use std::{
    cmp,
    collections::HashSet,
    sync::{Arc, Mutex},
};

use log::*;
use rand::seq::SliceRandom;

use crate::{
    config::PeerExchangeConfig,
    consts::REPORTED_PEERS_LIMIT,
    node::Node,
    peer::{Address, Peer},
    peer_group::PeerGroup,
};

const LOG_TARGET: &str = "network::peer_exchange::strategy";

pub struct PeerExchangeStrategy {
    config: PeerExchangeConfig,
    node: Arc<dyn Node>,
    peer_group: Arc<dyn PeerGroup>,
    used_addresses: Mutex<HashSet<Address>>,
}

impl PeerExchangeStrategy {
    pub fn new(config: PeerExchangeConfig, node: Arc<dyn Node>, peer_group: Arc<dyn PeerGroup>) -> Self {
        Self {
            config,
            node,
            peer_group,
            used_addresses: Mutex::new(HashSet::new()),
        }
    }

    /// Candidates for the first round of a bootstrap session: seeds, then reported, persisted and connected peers.
    pub fn addresses_for_initial_peer_exchange(&self) -> Vec<Address> {
        let mut priority_list = self.seed_addresses();
        priority_list.extend(self.reported_peer_addresses());
        priority_list.extend(self.persisted_addresses());
        priority_list.extend(self.all_connected_peer_addresses());
        self.select_candidates(priority_list, Vec::new)
    }

    /// Candidates for a retry round. Persisted peers are left out as they are likely to be stale when a round failed.
    pub fn addresses_for_retry_peer_exchange(&self) -> Vec<Address> {
        let mut priority_list = self.seed_addresses();
        priority_list.extend(self.reported_peer_addresses());
        priority_list.extend(self.all_connected_peer_addresses());
        self.select_candidates(priority_list, Vec::new)
    }

    /// Candidates for extending the peer group after bootstrap. Seeds are only used once all other candidates have
    /// been used.
    pub fn addresses_for_extending_peer_group(&self) -> Vec<Address> {
        let mut priority_list = self.reported_peer_addresses();
        priority_list.extend(self.persisted_addresses());
        self.select_candidates(priority_list, || self.seed_addresses())
    }

    /// The number of candidates to exchange with in a round
    pub fn exchange_limit(&self) -> usize {
        let min_num_connected = self.peer_group.min_num_connected_peers();
        let floor = min_num_connected / 4;
        let missing = self
            .peer_group
            .target_num_connected_peers()
            .saturating_sub(self.node.num_connections());
        let limit = cmp::max(floor, missing);

        // Even when well connected, keep exchanging with a few more peers until we have heard of enough peers
        if limit == floor && self.peer_group.reported_peers().len() < self.config.num_reported_peers_at_bootstrap / 4 {
            return min_num_connected / 2;
        }
        limit
    }

    /// The peers we report to `requester`: connected peers first, then reported peers. Never includes the requester.
    pub fn peers_for_reporting(&self, requester: &Address) -> Vec<Peer> {
        if !self.config.support_peer_reporting {
            return Vec::new();
        }

        let limit = self.config.max_num_peers;
        let mut peers = self
            .sorted_connected_peers()
            .into_iter()
            .filter(|peer| not_same_address(requester, peer))
            .take(limit)
            .collect::<Vec<_>>();

        let mut included = peers.iter().map(|p| p.address().clone()).collect::<HashSet<_>>();
        let remaining = limit.saturating_sub(peers.len());
        let reported = self
            .sorted_reported_peers()
            .into_iter()
            .filter(|peer| not_same_address(requester, peer))
            .filter(|peer| included.insert(peer.address().clone()))
            .take(remaining)
            .collect::<Vec<_>>();
        peers.extend(reported);
        peers
    }

    /// Merges peers reported by `reporter` into the reported and persisted peers. Returns the number of peers merged.
    pub fn add_reported_peers(&self, reported_peers: Vec<Peer>, reporter: &Address) -> usize {
        let num_reported = reported_peers.len();
        let mut peers = reported_peers
            .into_iter()
            .filter(|peer| not_same_address(reporter, peer))
            .filter(|peer| self.is_valid_non_seed_peer(peer.address()))
            .filter(|peer| self.is_not_outdated(peer))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        peers.sort();
        peers.truncate(REPORTED_PEERS_LIMIT);

        let num_merged = peers.len();
        debug!(
            target: LOG_TARGET,
            "Merging {} of {} peer(s) reported by `{}`", num_merged, num_reported, reporter
        );
        if num_merged > 0 {
            self.peer_group.add_reported_peers(peers.clone());
            self.peer_group.add_persisted_peers(peers);
        }
        num_merged
    }

    /// More than half of the exchanges in a round failed
    pub fn too_many_failures(num_success: usize, num_failures: usize) -> bool {
        let num_requests = num_success + num_failures;
        num_failures > num_requests / 2
    }

    pub fn needs_more_reported_peers(&self) -> bool {
        self.peer_group.reported_peers().len() < self.peer_group.min_num_reported_peers()
    }

    pub fn needs_more_connections(&self) -> bool {
        self.peer_group.all_connected_peers().len() < self.peer_group.target_num_connected_peers()
    }

    pub fn min_num_connected_peers(&self) -> usize {
        self.peer_group.min_num_connected_peers()
    }

    pub fn clear_persisted_peers(&self) {
        self.peer_group.clear_persisted_peers();
    }

    pub fn clear_reported_peers(&self) {
        self.peer_group.clear_reported_peers();
    }

    pub fn num_used_addresses(&self) -> usize {
        acquire_lock!(self.used_addresses).len()
    }

    pub fn not_a_seed(&self, address: &Address) -> bool {
        !self.peer_group.is_seed(address)
    }

    pub fn is_valid_non_seed_peer(&self, address: &Address) -> bool {
        self.not_a_seed(address) && self.peer_group.is_not_banned(address) && self.node.not_myself(address)
    }

    pub fn is_not_outdated(&self, peer: &Peer) -> bool {
        peer.age() < self.config.peer_max_age
    }

    pub fn is_not_used(&self, address: &Address) -> bool {
        !acquire_lock!(self.used_addresses).contains(address)
    }

    /// Removes used and duplicate addresses and applies the exchange limit. If every address was used before, the used
    /// addresses are reset once and the addresses from `after_reset` are appended.
    fn select_candidates<F>(&self, priority_list: Vec<Address>, after_reset: F) -> Vec<Address>
    where F: FnOnce() -> Vec<Address> {
        let limit = self.exchange_limit();
        let mut used_addresses = acquire_lock!(self.used_addresses);
        let mut candidates = unused_candidates(&priority_list, &used_addresses, limit);
        if candidates.is_empty() {
            debug!(
                target: LOG_TARGET,
                "All {} candidate(s) were used before. Resetting {} used address(es)",
                priority_list.len(),
                used_addresses.len()
            );
            used_addresses.clear();
            candidates = unused_candidates(&priority_list, &used_addresses, limit);
            for address in after_reset() {
                if !candidates.contains(&address) {
                    candidates.push(address);
                }
            }
        }
        used_addresses.extend(candidates.iter().cloned());
        candidates
    }

    fn seed_addresses(&self) -> Vec<Address> {
        let mut seeds = self.peer_group.seed_node_addresses();
        seeds.shuffle(&mut rand::thread_rng());
        seeds
            .into_iter()
            .filter(|address| self.node.not_myself(address))
            .filter(|address| self.peer_group.is_not_banned(address))
            .take(self.config.num_seed_nodes_at_bootstrap)
            .collect()
    }

    fn reported_peer_addresses(&self) -> Vec<Address> {
        self.sorted_reported_peers()
            .into_iter()
            .take(self.config.num_reported_peers_at_bootstrap)
            .map(Peer::into_address)
            .collect()
    }

    fn persisted_addresses(&self) -> Vec<Address> {
        let mut peers = self
            .peer_group
            .persisted_peers()
            .into_iter()
            .filter(|peer| self.is_valid_non_seed_peer(peer.address()))
            .filter(|peer| self.is_not_outdated(peer))
            .collect::<Vec<_>>();
        peers.sort();
        peers
            .into_iter()
            .take(self.config.num_persisted_peers_at_bootstrap)
            .map(Peer::into_address)
            .collect()
    }

    fn all_connected_peer_addresses(&self) -> Vec<Address> {
        self.sorted_connected_peers()
            .into_iter()
            .map(Peer::into_address)
            .collect()
    }

    fn sorted_connected_peers(&self) -> Vec<Peer> {
        let mut peers = self
            .peer_group
            .all_connected_peers()
            .into_iter()
            .filter(|peer| self.is_valid_non_seed_peer(peer.address()))
            .collect::<Vec<_>>();
        peers.sort();
        peers
    }

    fn sorted_reported_peers(&self) -> Vec<Peer> {
        let mut peers = self
            .peer_group
            .reported_peers()
            .into_iter()
            .filter(|peer| self.is_valid_non_seed_peer(peer.address()))
            .filter(|peer| self.is_not_outdated(peer))
            .collect::<Vec<_>>();
        peers.sort();
        peers
    }
}

pub fn not_same_address(address: &Address, peer: &Peer) -> bool {
    peer.address() != address
}

fn unused_candidates(priority_list: &[Address], used_addresses: &HashSet<Address>, limit: usize) -> Vec<Address> {
    let mut seen = HashSet::new();
    priority_list
        .iter()
        .filter(|address| !used_addresses.contains(*address))
        .filter(|address| seen.insert(*address))
        .take(limit)
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{
        config::PeerGroupConfig,
        peer_group::MemoryPeerGroup,
        test_utils::{make_address, make_aged_peer, make_peer, mocks::create_mock_node},
    };

    const ME: u16 = 1;

    fn setup(
        config: PeerExchangeConfig,
        peer_group_config: PeerGroupConfig,
        seeds: Vec<Address>,
    ) -> (PeerExchangeStrategy, MemoryPeerGroup) {
        let node = create_mock_node(make_address(ME));
        let peer_group = MemoryPeerGroup::new(peer_group_config, seeds);
        let strategy = PeerExchangeStrategy::new(config, Arc::new(node), Arc::new(peer_group.clone()));
        (strategy, peer_group)
    }

    fn setup_default() -> (PeerExchangeStrategy, MemoryPeerGroup) {
        setup(
            PeerExchangeConfig::default(),
            PeerGroupConfig::default(),
            vec![make_address(100), make_address(101)],
        )
    }

    #[test]
    fn it_prioritises_seeds_then_reported_then_persisted_then_connected() {
        let (strategy, peer_group) = setup_default();
        peer_group.add_reported_peers(vec![make_peer(10)]);
        peer_group.add_persisted_peers(vec![make_peer(20)]);
        peer_group.set_connected_peers(vec![make_peer(30)]);

        let candidates = strategy.addresses_for_initial_peer_exchange();
        assert_eq!(candidates.len(), 5);
        let seeds = candidates[..2].iter().cloned().collect::<HashSet<_>>();
        assert_eq!(seeds, [make_address(100), make_address(101)].into_iter().collect());
        assert_eq!(&candidates[2..], &[make_address(10), make_address(20), make_address(30)]);
    }

    #[test]
    fn it_removes_duplicates_and_invalid_addresses() {
        let (strategy, peer_group) = setup_default();
        // Reported and persisted as well as connected
        peer_group.add_reported_peers(vec![make_peer(10), make_peer(ME)]);
        peer_group.add_persisted_peers(vec![make_peer(10), make_aged_peer(11, Duration::from_secs(6 * 24 * 60 * 60))]);
        peer_group.set_connected_peers(vec![make_peer(10), make_peer(100)]);
        peer_group.ban(make_address(101));

        let candidates = strategy.addresses_for_initial_peer_exchange();
        assert_eq!(candidates, vec![make_address(100), make_address(10)]);
    }

    #[test]
    fn it_does_not_repeat_addresses_until_exhausted() {
        let config = PeerExchangeConfig {
            num_seed_nodes_at_bootstrap: 0,
            ..Default::default()
        };
        let peer_group_config = PeerGroupConfig {
            min_num_connected_peers: 8,
            max_num_connected_peers: 8,
            ..Default::default()
        };
        let (strategy, peer_group) = setup(config, peer_group_config, vec![]);
        peer_group.add_reported_peers((10..22).map(make_peer).collect());

        let first = strategy.addresses_for_initial_peer_exchange();
        assert_eq!(first.len(), 8);
        let second = strategy.addresses_for_initial_peer_exchange();
        assert_eq!(second.len(), 4);
        assert!(second.iter().all(|a| !first.contains(a)));
        assert_eq!(strategy.num_used_addresses(), 12);

        // Exhausted, so the used addresses are reset and the highest priority addresses are used again
        let third = strategy.addresses_for_initial_peer_exchange();
        assert_eq!(third, first);
        assert_eq!(strategy.num_used_addresses(), 8);
    }

    #[test]
    fn it_extends_with_reported_and_persisted_peers_only() {
        let (strategy, peer_group) = setup_default();
        peer_group.add_reported_peers(vec![make_peer(10)]);
        peer_group.add_persisted_peers(vec![make_peer(20)]);
        peer_group.set_connected_peers(vec![make_peer(30)]);

        let candidates = strategy.addresses_for_extending_peer_group();
        assert_eq!(candidates, vec![make_address(10), make_address(20)]);
        assert!(!strategy.is_not_used(&make_address(10)));

        // All used: reset and fall back to seeds
        let mut candidates = strategy.addresses_for_extending_peer_group();
        assert_eq!(&candidates[..2], &[make_address(10), make_address(20)]);
        candidates.sort();
        assert_eq!(candidates, vec![
            make_address(10),
            make_address(20),
            make_address(100),
            make_address(101)
        ]);
    }

    #[test]
    fn retry_candidates_exclude_persisted_peers() {
        let (strategy, peer_group) = setup(PeerExchangeConfig::default(), PeerGroupConfig::default(), vec![]);
        peer_group.add_reported_peers(vec![make_peer(10)]);
        peer_group.add_persisted_peers(vec![make_peer(20)]);
        peer_group.set_connected_peers(vec![make_peer(30)]);

        let candidates = strategy.addresses_for_retry_peer_exchange();
        assert_eq!(candidates, vec![make_address(10), make_address(30)]);
    }

    #[test]
    fn exchange_limit() {
        // target = 10, no connections
        let (strategy, peer_group) = setup_default();
        assert_eq!(strategy.exchange_limit(), 10);

        // Well connected (floor = 8 / 4 = 2) but fewer than 40 / 4 reported peers: 8 / 2
        let conns = (10..20).map(make_peer).collect::<Vec<_>>();
        let node = create_mock_node(make_address(ME));
        node.get_shared_state().set_num_connections(10);
        let strategy_connected = PeerExchangeStrategy::new(
            PeerExchangeConfig::default(),
            Arc::new(node),
            Arc::new(peer_group.clone()),
        );
        assert_eq!(strategy_connected.exchange_limit(), 4);

        // Enough reported peers: floor
        peer_group.add_reported_peers(conns);
        assert_eq!(strategy_connected.exchange_limit(), 2);
        // Unaffected by reported peers when missing connections
        assert_eq!(strategy.exchange_limit(), 10);
    }

    #[test]
    fn peers_for_reporting_never_includes_the_requester() {
        let (strategy, peer_group) = setup_default();
        let requester = make_address(10);
        peer_group.set_connected_peers(vec![make_peer(10), make_peer(11), make_peer(100)]);
        peer_group.add_reported_peers(vec![make_peer(10), make_peer(11), make_peer(12)]);

        let peers = strategy.peers_for_reporting(&requester);
        assert!(peers.iter().all(|p| *p.address() != requester));
        let addresses = peers.iter().map(|p| p.address().clone()).collect::<Vec<_>>();
        // Connected peers first, without the seed, without duplicates
        assert_eq!(addresses, vec![make_address(11), make_address(12)]);
    }

    #[test]
    fn peers_for_reporting_is_capped() {
        let config = PeerExchangeConfig {
            max_num_peers: 3,
            ..Default::default()
        };
        let (strategy, peer_group) = setup(config, PeerGroupConfig::default(), vec![]);
        peer_group.set_connected_peers((10..12).map(make_peer).collect());
        peer_group.add_reported_peers((20..30).map(make_peer).collect());
        let peers = strategy.peers_for_reporting(&make_address(50));
        assert_eq!(peers.len(), 3);
        assert_eq!(peers[0].address(), &make_address(10));
        assert_eq!(peers[1].address(), &make_address(11));
    }

    #[test]
    fn peers_for_reporting_can_be_disabled() {
        let config = PeerExchangeConfig {
            support_peer_reporting: false,
            ..Default::default()
        };
        let (strategy, peer_group) = setup(config, PeerGroupConfig::default(), vec![]);
        peer_group.set_connected_peers(vec![make_peer(10)]);
        assert!(strategy.peers_for_reporting(&make_address(50)).is_empty());
    }

    #[test]
    fn add_reported_peers_filters_invalid_peers() {
        let (strategy, peer_group) = setup_default();
        peer_group.ban(make_address(13));
        let reporter = make_address(10);
        let peers = vec![
            make_peer(10),
            make_peer(11),
            make_peer(11),
            make_peer(100),
            make_peer(ME),
            make_peer(13),
            make_aged_peer(14, Duration::from_secs(5 * 24 * 60 * 60 + 1)),
            make_aged_peer(15, Duration::from_secs(60)),
        ];
        let num_merged = strategy.add_reported_peers(peers, &reporter);
        assert_eq!(num_merged, 2);

        let mut reported = peer_group
            .reported_peers()
            .into_iter()
            .map(Peer::into_address)
            .collect::<Vec<_>>();
        reported.sort();
        assert_eq!(reported, vec![make_address(11), make_address(15)]);
        assert_eq!(peer_group.persisted_peers().len(), 2);
    }

    #[test]
    fn add_reported_peers_is_capped() {
        let (strategy, peer_group) = setup(PeerExchangeConfig::default(), PeerGroupConfig::default(), vec![]);
        let now = Utc::now();
        let peers = (0..600u16)
            .map(|i| Peer::new(make_address(1000 + i), now - chrono::Duration::seconds(i64::from(i))))
            .collect();
        assert_eq!(strategy.add_reported_peers(peers, &make_address(10)), REPORTED_PEERS_LIMIT);
        let reported = peer_group.reported_peers();
        assert_eq!(reported.len(), REPORTED_PEERS_LIMIT);
        // The newest peers are kept
        assert!(reported.iter().all(|p| p.address().port() < 1000 + REPORTED_PEERS_LIMIT as u16));
    }

    #[test]
    fn round_policy() {
        assert!(!PeerExchangeStrategy::too_many_failures(6, 4));
        assert!(!PeerExchangeStrategy::too_many_failures(5, 5));
        assert!(PeerExchangeStrategy::too_many_failures(4, 6));
        assert!(PeerExchangeStrategy::too_many_failures(0, 1));
        assert!(!PeerExchangeStrategy::too_many_failures(0, 0));

        let (strategy, peer_group) = setup_default();
        assert!(strategy.needs_more_reported_peers());
        assert!(strategy.needs_more_connections());
        peer_group.add_reported_peers(vec![make_peer(10)]);
        peer_group.set_connected_peers((10..20).map(make_peer).collect());
        assert!(!strategy.needs_more_reported_peers());
        assert!(!strategy.needs_more_connections());
    }
}
