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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    consts::{MAX_AGE, REPORTED_PEERS_LIMIT, ROUND_TIMEOUT},
    error::PeerExchangeError,
    serializers,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerExchangeConfig {
    /// The number of seed nodes to exchange with when bootstrapping.
    /// Default: 2
    pub num_seed_nodes_at_bootstrap: usize,
    /// The maximum number of persisted peers to exchange with when bootstrapping.
    /// Default: 40
    pub num_persisted_peers_at_bootstrap: usize,
    /// The maximum number of reported peers to exchange with when bootstrapping.
    /// Default: 40
    pub num_reported_peers_at_bootstrap: usize,
    /// If false, we never report our known peers to other nodes. Inbound requests are still answered with an empty
    /// peer list.
    /// Default: true
    pub support_peer_reporting: bool,
    /// The maximum number of peers sent or accepted in a single peer exchange message. Must not exceed 500.
    /// Default: 500
    pub max_num_peers: usize,
    /// Peers last seen longer ago than this are discarded.
    /// Default: 5 days
    #[serde(with = "serializers::seconds")]
    pub peer_max_age: Duration,
    /// The delay before the first retry. Subsequent retries double the delay.
    /// Default: 1 second
    #[serde(with = "serializers::seconds")]
    pub retry_base_delay: Duration,
    /// The upper bound on the retry delay.
    /// Default: 20 seconds
    #[serde(with = "serializers::seconds")]
    pub max_retry_delay: Duration,
    /// Give up retrying after this many consecutive retries. `None` retries forever.
    /// Default: 10
    pub max_retry_attempts: Option<usize>,
    /// The time given to a round to reach its minimum number of successful exchanges.
    /// Default: 90 seconds
    #[serde(with = "serializers::seconds")]
    pub round_timeout: Duration,
    /// The time allowed for establishing a connection to a candidate.
    /// Default: 30 seconds
    #[serde(with = "serializers::seconds")]
    pub dial_timeout: Duration,
    /// The time allowed for a peer to respond to a request once sent.
    /// Default: 45 seconds
    #[serde(with = "serializers::seconds")]
    pub response_timeout: Duration,
}

impl PeerExchangeConfig {
    /// Short timeouts and delays suitable for local tests
    pub fn default_local_test() -> Self {
        Self {
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(4),
            round_timeout: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), PeerExchangeError> {
        if self.max_num_peers > REPORTED_PEERS_LIMIT {
            return Err(PeerExchangeError::InvalidConfig(format!(
                "max_num_peers ({}) must not exceed {}",
                self.max_num_peers, REPORTED_PEERS_LIMIT
            )));
        }
        if self.retry_base_delay > self.max_retry_delay {
            return Err(PeerExchangeError::InvalidConfig(format!(
                "retry_base_delay ({:.2?}) must not exceed max_retry_delay ({:.2?})",
                self.retry_base_delay, self.max_retry_delay
            )));
        }
        if self.round_timeout.is_zero() || self.dial_timeout.is_zero() || self.response_timeout.is_zero() {
            return Err(PeerExchangeError::InvalidConfig(
                "round_timeout, dial_timeout and response_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PeerExchangeConfig {
    fn default() -> Self {
        Self {
            num_seed_nodes_at_bootstrap: 2,
            num_persisted_peers_at_bootstrap: 40,
            num_reported_peers_at_bootstrap: 40,
            support_peer_reporting: true,
            max_num_peers: REPORTED_PEERS_LIMIT,
            peer_max_age: MAX_AGE,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(20),
            max_retry_attempts: Some(10),
            round_timeout: ROUND_TIMEOUT,
            dial_timeout: Duration::from_secs(30),
            response_timeout: Duration::from_secs(45),
        }
    }
}

/// Connectivity targets of the in-memory peer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerGroupConfig {
    /// Default: 8
    pub min_num_connected_peers: usize,
    /// Default: 12
    pub max_num_connected_peers: usize,
    /// Default: 1
    pub min_num_reported_peers: usize,
    /// The maximum number of reported peers and of persisted peers kept. The oldest peers are evicted first.
    /// Default: 1000
    pub max_num_stored_peers: usize,
}

impl PeerGroupConfig {
    /// Halfway between the minimum and maximum number of connected peers
    pub fn target_num_connected_peers(&self) -> usize {
        self.min_num_connected_peers +
            self.max_num_connected_peers.saturating_sub(self.min_num_connected_peers) / 2
    }

    pub fn validate(&self) -> Result<(), PeerExchangeError> {
        if self.min_num_connected_peers > self.max_num_connected_peers {
            return Err(PeerExchangeError::InvalidConfig(format!(
                "min_num_connected_peers ({}) must not exceed max_num_connected_peers ({})",
                self.min_num_connected_peers, self.max_num_connected_peers
            )));
        }
        if self.max_num_stored_peers == 0 {
            return Err(PeerExchangeError::InvalidConfig(
                "max_num_stored_peers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PeerGroupConfig {
    fn default() -> Self {
        Self {
            min_num_connected_peers: 8,
            max_num_connected_peers: 12,
            min_num_reported_peers: 1,
            max_num_stored_peers: 1000,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PeerExchangeConfig::default().validate().unwrap();
        PeerExchangeConfig::default_local_test().validate().unwrap();
        PeerGroupConfig::default().validate().unwrap();
    }

    #[test]
    fn it_rejects_invalid_config() {
        let config = PeerExchangeConfig {
            max_num_peers: REPORTED_PEERS_LIMIT + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PeerExchangeError::InvalidConfig(_))));

        let config = PeerExchangeConfig {
            retry_base_delay: Duration::from_secs(30),
            max_retry_delay: Duration::from_secs(20),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PeerGroupConfig {
            min_num_connected_peers: 10,
            max_num_connected_peers: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PeerGroupConfig {
            max_num_stored_peers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn target_is_halfway_between_min_and_max() {
        assert_eq!(PeerGroupConfig::default().target_num_connected_peers(), 10);
        let config = PeerGroupConfig {
            min_num_connected_peers: 3,
            max_num_connected_peers: 6,
            ..Default::default()
        };
        assert_eq!(config.target_num_connected_peers(), 4);
    }

    #[test]
    fn it_deserializes_partial_config() {
        let config: PeerExchangeConfig =
            serde_json::from_str(r#"{"num_seed_nodes_at_bootstrap": 4, "max_retry_delay": 60}"#).unwrap();
        assert_eq!(config.num_seed_nodes_at_bootstrap, 4);
        assert_eq!(config.max_retry_delay, Duration::from_secs(60));
        assert_eq!(config.round_timeout, ROUND_TIMEOUT);

        let err = serde_json::from_str::<PeerExchangeConfig>(r#"{"not_a_field": 1}"#);
        assert!(err.is_err());
    }
}
