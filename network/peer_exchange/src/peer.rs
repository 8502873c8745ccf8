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
    cmp::Ordering,
    fmt,
    str::FromStr,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PeerExchangeError;

/// The overlay transport an address is reachable over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportType {
    Clear,
    Tor,
    I2p,
}

impl TransportType {
    /// Infer the transport from the host name suffix
    pub fn from_host(host: &str) -> Self {
        if host.ends_with(".onion") {
            TransportType::Tor
        } else if host.ends_with(".i2p") {
            TransportType::I2p
        } else {
            TransportType::Clear
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Clear => write!(f, "clear"),
            TransportType::Tor => write!(f, "tor"),
            TransportType::I2p => write!(f, "i2p"),
        }
    }
}

/// A network reachable endpoint. Addresses are compared, hashed and sorted by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
    transport: TransportType,
}

impl Address {
    pub fn new<T: Into<String>>(host: T, port: u16) -> Self {
        let host = host.into();
        let transport = TransportType::from_host(&host);
        Self { host, port, transport }
    }

    pub fn with_transport<T: Into<String>>(host: T, port: u16, transport: TransportType) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> TransportType {
        self.transport
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = PeerExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| PeerExchangeError::AddressParse(format!("'{}' is missing a port", s)))?;
        if host.is_empty() {
            return Err(PeerExchangeError::AddressParse(format!("'{}' is missing a host", s)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|err| PeerExchangeError::AddressParse(format!("'{}' has an invalid port: {}", s, err)))?;
        Ok(Address::new(host, port))
    }
}

/// A peer record: an address together with the time the peer was last known to be alive.
///
/// Peers sort newest first, ties are broken by address so that peer lists have a deterministic order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    address: Address,
    created: DateTime<Utc>,
}

impl Peer {
    pub fn new(address: Address, created: DateTime<Utc>) -> Self {
        Self { address, created }
    }

    /// Creates a peer that was last seen now
    pub fn from_address(address: Address) -> Self {
        Self::new(address, Utc::now())
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Time elapsed since this peer was last seen. Timestamps in the future have an age of zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.created).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn into_address(self) -> Address {
        self.address
    }
}

impl Ord for Peer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .created
            .cmp(&self.created)
            .then_with(|| self.address.cmp(&other.address))
    }
}

impl PartialOrd for Peer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (last seen {})", self.address, self.created)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[test]
    fn it_parses_addresses() {
        let address = "127.0.0.1:9999".parse::<Address>().unwrap();
        assert_eq!(address.host(), "127.0.0.1");
        assert_eq!(address.port(), 9999);
        assert_eq!(address.transport(), TransportType::Clear);
        assert_eq!(address.to_string(), "127.0.0.1:9999");

        let address = "abcdefgh.onion:1000".parse::<Address>().unwrap();
        assert_eq!(address.transport(), TransportType::Tor);

        let address = "abcdefgh.b32.i2p:1000".parse::<Address>().unwrap();
        assert_eq!(address.transport(), TransportType::I2p);
    }

    #[test]
    fn it_rejects_malformed_addresses() {
        assert!("127.0.0.1".parse::<Address>().is_err());
        assert!(":9999".parse::<Address>().is_err());
        assert!("localhost:99999".parse::<Address>().is_err());
        assert!("localhost:port".parse::<Address>().is_err());
    }

    #[test]
    fn it_sorts_newest_first() {
        let now = Utc::now();
        let old = Peer::new(Address::new("a", 1), now - ChronoDuration::hours(2));
        let newer = Peer::new(Address::new("b", 1), now - ChronoDuration::hours(1));
        let newest_b = Peer::new(Address::new("b", 2), now);
        let newest_a = Peer::new(Address::new("a", 2), now);

        let mut peers = vec![old.clone(), newest_b.clone(), newer.clone(), newest_a.clone()];
        peers.sort();
        assert_eq!(peers, vec![newest_a, newest_b, newer, old]);
    }

    #[test]
    fn it_calculates_age() {
        let peer = Peer::new(Address::new("a", 1), Utc::now() - ChronoDuration::hours(1));
        assert!(peer.age() >= Duration::from_secs(60 * 60));
        assert!(peer.age() < Duration::from_secs(2 * 60 * 60));

        let peer = Peer::new(Address::new("a", 1), Utc::now() + ChronoDuration::hours(1));
        assert_eq!(peer.age(), Duration::ZERO);
    }
}
