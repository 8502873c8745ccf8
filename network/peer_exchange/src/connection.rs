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
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
        Mutex,
    },
};

use log::*;
use tokio::sync::oneshot;

use crate::{error::PeerExchangeError, message::PeerExchangeResponse, peer::Address};

const LOG_TARGET: &str = "network::peer_exchange::connection";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates a process-unique connection id
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to a connection established by the transport.
///
/// Each connection owns a dispatch table of outstanding peer exchange requests keyed by nonce. Responses delivered by
/// the transport are routed to the single waiter registered for the response nonce. Closing the connection drops
/// every waiter, which cancels the pending requests.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: ConnectionId,
    peer_address: Address,
    pending_responses: Mutex<HashMap<i32, oneshot::Sender<PeerExchangeResponse>>>,
    is_closed: AtomicBool,
}

impl Connection {
    pub fn new(id: ConnectionId, peer_address: Address) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                peer_address,
                pending_responses: Mutex::new(HashMap::new()),
                is_closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer_address(&self) -> &Address {
        &self.inner.peer_address
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed.load(Ordering::SeqCst)
    }

    pub fn num_pending_responses(&self) -> usize {
        acquire_lock!(self.inner.pending_responses).len()
    }

    /// Registers interest in the response carrying `nonce`. The returned receiver resolves with the first response
    /// dispatched for the nonce, or errors when the registration is removed or the connection closes.
    pub fn register_nonce(&self, nonce: i32) -> Result<oneshot::Receiver<PeerExchangeResponse>, PeerExchangeError> {
        let mut pending = acquire_lock!(self.inner.pending_responses);
        // Checked under the lock so that a concurrent close cannot miss this registration
        if self.is_closed() {
            return Err(PeerExchangeError::ConnectionClosed);
        }
        if pending.contains_key(&nonce) {
            return Err(PeerExchangeError::NonceInUse {
                connection_id: self.id(),
                nonce,
            });
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        pending.insert(nonce, reply_tx);
        Ok(reply_rx)
    }

    /// Removes the registration for `nonce`, returning true if one existed
    pub fn unregister_nonce(&self, nonce: i32) -> bool {
        acquire_lock!(self.inner.pending_responses).remove(&nonce).is_some()
    }

    /// Routes a response to the request waiting on its nonce. A response that matches no outstanding request is
    /// returned as an `UnmatchedResponse` error and has no other effect.
    pub fn dispatch_response(&self, response: PeerExchangeResponse) -> Result<(), PeerExchangeError> {
        let nonce = response.nonce();
        let reply_tx = acquire_lock!(self.inner.pending_responses).remove(&nonce);
        match reply_tx {
            Some(reply_tx) => {
                if reply_tx.send(response).is_err() {
                    debug!(
                        target: LOG_TARGET,
                        "Request for nonce {} on connection {} was dropped before the response arrived",
                        nonce,
                        self.id()
                    );
                }
                Ok(())
            },
            None => Err(PeerExchangeError::UnmatchedResponse { nonce }),
        }
    }

    /// Closes the connection, cancelling all pending requests
    pub fn close(&self) {
        let mut pending = acquire_lock!(self.inner.pending_responses);
        if !self.inner.is_closed.swap(true, Ordering::SeqCst) {
            debug!(
                target: LOG_TARGET,
                "Connection {} to `{}` closed with {} pending request(s)",
                self.id(),
                self.peer_address(),
                pending.len()
            );
        }
        pending.clear();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("peer_address", self.peer_address())
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.peer_address())
    }
}
