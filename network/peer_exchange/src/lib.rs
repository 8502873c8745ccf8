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

//! # Tari Peer Exchange
//!
//! Gossip based peer discovery. A node bootstraps its overlay neighbourhood by exchanging lists of known peers with
//! seed nodes and previously known peers, and keeps exchanging until it has enough connections and reported peers.
//!
//! The main components are:
//!
//! - [PeerExchangeService](crate::service::PeerExchangeService) coordinates rounds of concurrent exchanges, retries
//!   with backoff and answers inbound requests.
//! - [PeerExchangeStrategy](crate::strategy::PeerExchangeStrategy) selects candidate addresses and decides which peers
//!   to report and which reported peers to keep.
//! - [PeerExchangeRequestHandler](crate::request_handler::PeerExchangeRequestHandler) performs a single
//!   request/response exchange over a [Connection](crate::connection::Connection).
//!
//! The transport and peer storage are supplied by implementing [Node](crate::node::Node) and
//! [PeerGroup](crate::peer_group::PeerGroup).

#[macro_use]
mod macros;

pub mod backoff;

mod config;
pub use config::{PeerExchangeConfig, PeerGroupConfig};

pub mod connection;

pub mod consts;

mod error;
pub use error::PeerExchangeError;

pub mod message;

pub mod node;

pub mod peer;

pub mod peer_group;

pub mod request_handler;

mod serializers;

pub mod service;
pub use service::{PeerExchangeEvent, PeerExchangeService, RoundKind, RoundRelease, RoundResult};

pub mod shutdown;

pub mod strategy;

#[cfg(any(test, feature = "test-mocks"))]
pub mod test_utils;
