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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{consts::REPORTED_PEERS_LIMIT, error::PeerExchangeError, peer::Peer};

/// Asks the remote node for its known peers, offering our own known peers in return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerExchangeRequest {
    nonce: i32,
    peers: Vec<Peer>,
}

impl PeerExchangeRequest {
    pub fn nonce(&self) -> i32 {
        self.nonce
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn into_peers(self) -> Vec<Peer> {
        self.peers
    }
}

/// Reply to a `PeerExchangeRequest`, correlated by `nonce`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerExchangeResponse {
    nonce: i32,
    peers: Vec<Peer>,
}

impl PeerExchangeResponse {
    /// Creates a response without validating the peer list. Use a `PeerExchangeMessageFactory` to construct responses
    /// that are sent to remote nodes.
    pub fn new(nonce: i32, peers: Vec<Peer>) -> Self {
        Self { nonce, peers }
    }

    pub fn nonce(&self) -> i32 {
        self.nonce
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn into_peers(self) -> Vec<Peer> {
        self.peers
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerExchangeMessage {
    Request(PeerExchangeRequest),
    Response(PeerExchangeResponse),
}

impl PeerExchangeMessage {
    pub fn nonce(&self) -> i32 {
        match self {
            PeerExchangeMessage::Request(request) => request.nonce(),
            PeerExchangeMessage::Response(response) => response.nonce(),
        }
    }

    pub fn peers(&self) -> &[Peer] {
        match self {
            PeerExchangeMessage::Request(request) => request.peers(),
            PeerExchangeMessage::Response(response) => response.peers(),
        }
    }

    is_fn!(is_request, PeerExchangeMessage::Request(..));

    is_fn!(is_response, PeerExchangeMessage::Response(..));
}

impl From<PeerExchangeRequest> for PeerExchangeMessage {
    fn from(request: PeerExchangeRequest) -> Self {
        PeerExchangeMessage::Request(request)
    }
}

impl From<PeerExchangeResponse> for PeerExchangeMessage {
    fn from(response: PeerExchangeResponse) -> Self {
        PeerExchangeMessage::Response(response)
    }
}

impl fmt::Display for PeerExchangeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerExchangeMessage::Request(request) => write!(
                f,
                "PeerExchangeRequest(nonce = {}, {} peer(s))",
                request.nonce,
                request.peers.len()
            ),
            PeerExchangeMessage::Response(response) => write!(
                f,
                "PeerExchangeResponse(nonce = {}, {} peer(s))",
                response.nonce,
                response.peers.len()
            ),
        }
    }
}

/// Constructs and validates peer exchange messages against a maximum peer list length. Peer lists are sorted so that
/// the same set of peers always produces the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerExchangeMessageFactory {
    max_num_peers: usize,
}

impl PeerExchangeMessageFactory {
    pub fn new(max_num_peers: usize) -> Result<Self, PeerExchangeError> {
        if max_num_peers > REPORTED_PEERS_LIMIT {
            return Err(PeerExchangeError::InvalidConfig(format!(
                "max_num_peers ({}) must not exceed {}",
                max_num_peers, REPORTED_PEERS_LIMIT
            )));
        }
        Ok(Self { max_num_peers })
    }

    pub fn max_num_peers(&self) -> usize {
        self.max_num_peers
    }

    pub fn create_request(&self, nonce: i32, peers: Vec<Peer>) -> Result<PeerExchangeRequest, PeerExchangeError> {
        let peers = self.check_and_sort(peers)?;
        Ok(PeerExchangeRequest { nonce, peers })
    }

    pub fn create_response(&self, nonce: i32, peers: Vec<Peer>) -> Result<PeerExchangeResponse, PeerExchangeError> {
        let peers = self.check_and_sort(peers)?;
        Ok(PeerExchangeResponse { nonce, peers })
    }

    /// Validates a message received from a remote node
    pub fn validate(&self, message: &PeerExchangeMessage) -> Result<(), PeerExchangeError> {
        self.validate_peers(message.peers())
    }

    pub fn validate_peers(&self, peers: &[Peer]) -> Result<(), PeerExchangeError> {
        self.check_len(peers.len())
    }

    fn check_and_sort(&self, mut peers: Vec<Peer>) -> Result<Vec<Peer>, PeerExchangeError> {
        self.check_len(peers.len())?;
        peers.sort();
        Ok(peers)
    }

    fn check_len(&self, len: usize) -> Result<(), PeerExchangeError> {
        if len > self.max_num_peers {
            return Err(PeerExchangeError::PeerListTooLarge {
                len,
                max: self.max_num_peers,
            });
        }
        Ok(())
    }
}

impl Default for PeerExchangeMessageFactory {
    fn default() -> Self {
        Self {
            max_num_peers: REPORTED_PEERS_LIMIT,
        }
    }
}
