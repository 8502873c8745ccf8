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

use thiserror::Error;

use crate::{connection::ConnectionId, peer::Address};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerExchangeError {
    #[error("Failed to dial `{address}`: {details}")]
    DialFailed { address: Address, details: String },
    #[error("Dialing `{0}` timed out")]
    DialTimeout(Address),
    #[error("Failed to send message: {0}")]
    SendFailed(String),
    #[error("Connection closed before a response was received")]
    ConnectionClosed,
    #[error("No response was received within {0:.2?}")]
    ResponseTimeout(Duration),
    #[error("Response nonce {nonce} does not match any outstanding request")]
    UnmatchedResponse { nonce: i32 },
    #[error("Nonce {nonce} is already awaiting a response on connection {connection_id}")]
    NonceInUse { connection_id: ConnectionId, nonce: i32 },
    #[error("Peer list of length {len} exceeds the maximum of {max}")]
    PeerListTooLarge { len: usize, max: usize },
    #[error("Minimum number of successful exchanges must be greater than zero")]
    InvalidMinSuccess,
    #[error("A peer exchange request is already pending on connection {0}")]
    DuplicateRequest(ConnectionId),
    #[error("The request was cancelled")]
    RequestCancelled,
    #[error("Invalid request handler state: {0}")]
    InvalidHandlerState(String),
    #[error("Peer exchange round did not complete within {0:.2?}")]
    RoundTimeout(Duration),
    #[error("Peer exchange service is shutting down")]
    ShuttingDown,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid address: {0}")]
    AddressParse(String),
}

impl PeerExchangeError {
    /// True if the error was caused by the transport. These errors count as a failed exchange attempt.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            PeerExchangeError::DialFailed { .. } |
                PeerExchangeError::DialTimeout(_) |
                PeerExchangeError::SendFailed(_) |
                PeerExchangeError::ConnectionClosed |
                PeerExchangeError::ResponseTimeout(_)
        )
    }

    /// True if a remote message did not fit the protocol. These are logged and otherwise ignored.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            PeerExchangeError::UnmatchedResponse { .. } | PeerExchangeError::PeerListTooLarge { .. }
        )
    }

    /// True if the caller violated a precondition. These are returned immediately and never retried.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            PeerExchangeError::InvalidMinSuccess | PeerExchangeError::PeerListTooLarge { .. }
        )
    }

    is_fn!(is_round_timeout, PeerExchangeError::RoundTimeout(..));

    is_fn!(is_cancelled, PeerExchangeError::RequestCancelled);
}
