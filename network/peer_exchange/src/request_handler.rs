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
    fmt,
    sync::{Arc, Mutex},
};

use log::*;
use rand::{rngs::OsRng, RngCore};
use tokio::time::Instant;

use crate::{
    connection::Connection,
    error::PeerExchangeError,
    message::PeerExchangeMessageFactory,
    node::Node,
    peer::Peer,
};

const LOG_TARGET: &str = "network::peer_exchange::request_handler";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Created,
    RequestSent,
    ResponseReceived,
    ConnectionClosed,
    SendFailed,
    Disposed,
}

impl HandlerState {
    is_fn!(is_disposed, HandlerState::Disposed);
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Performs a single peer exchange request over a connection and awaits the response correlated by a random nonce.
pub struct PeerExchangeRequestHandler {
    node: Arc<dyn Node>,
    connection: Connection,
    message_factory: PeerExchangeMessageFactory,
    nonce: i32,
    state: Mutex<HandlerState>,
}

impl PeerExchangeRequestHandler {
    pub fn new(node: Arc<dyn Node>, connection: Connection, message_factory: PeerExchangeMessageFactory) -> Self {
        Self {
            node,
            connection,
            message_factory,
            nonce: OsRng.next_u32() as i32,
            state: Mutex::new(HandlerState::Created),
        }
    }

    pub fn nonce(&self) -> i32 {
        self.nonce
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> HandlerState {
        *acquire_lock!(self.state)
    }

    /// Sends our peers and resolves with the peers from the correlated response.
    ///
    /// Resolves with an error if sending fails, the connection closes or the handler is disposed before the response
    /// arrives. The handler disposes itself if sending fails.
    pub async fn request(&self, my_peers: Vec<Peer>) -> Result<Vec<Peer>, PeerExchangeError> {
        let request = self.message_factory.create_request(self.nonce, my_peers)?;
        let reply_rx = {
            let mut state = acquire_lock!(self.state);
            match *state {
                HandlerState::Created => {},
                HandlerState::Disposed => return Err(PeerExchangeError::RequestCancelled),
                s => return Err(PeerExchangeError::InvalidHandlerState(s.to_string())),
            }
            let reply_rx = match self.connection.register_nonce(self.nonce) {
                Ok(rx) => rx,
                Err(err) => {
                    if matches!(err, PeerExchangeError::ConnectionClosed) {
                        *state = HandlerState::ConnectionClosed;
                    }
                    return Err(err);
                },
            };
            *state = HandlerState::RequestSent;
            reply_rx
        };

        let sent_at = Instant::now();
        trace!(
            target: LOG_TARGET,
            "Sending peer exchange request (nonce = {}) with {} peer(s) to {}",
            self.nonce,
            request.peers().len(),
            self.connection
        );
        if let Err(err) = self.node.send(request.into(), &self.connection).await {
            debug!(
                target: LOG_TARGET,
                "Failed to send peer exchange request to {}: {}", self.connection, err
            );
            self.set_state_unless_disposed(HandlerState::SendFailed);
            self.dispose();
            return Err(err);
        }

        match reply_rx.await {
            Ok(response) => {
                self.set_state_unless_disposed(HandlerState::ResponseReceived);
                debug!(
                    target: LOG_TARGET,
                    "Received {} peer(s) from {} in {:.2?}",
                    response.peers().len(),
                    self.connection,
                    sent_at.elapsed()
                );
                Ok(response.into_peers())
            },
            Err(_) => {
                let mut state = acquire_lock!(self.state);
                if state.is_disposed() {
                    Err(PeerExchangeError::RequestCancelled)
                } else {
                    *state = HandlerState::ConnectionClosed;
                    Err(PeerExchangeError::ConnectionClosed)
                }
            },
        }
    }

    /// Releases the response registration. Any pending `request` resolves with `RequestCancelled`. Calling this more
    /// than once has no effect.
    pub fn dispose(&self) {
        let mut state = acquire_lock!(self.state);
        if state.is_disposed() {
            return;
        }
        *state = HandlerState::Disposed;
        // Removing the registration under the state lock ensures a waiter observes `Disposed` when it is woken
        if self.connection.unregister_nonce(self.nonce) {
            trace!(
                target: LOG_TARGET,
                "Disposed pending request (nonce = {}) on {}", self.nonce, self.connection
            );
        }
    }

    fn set_state_unless_disposed(&self, new_state: HandlerState) {
        let mut state = acquire_lock!(self.state);
        if !state.is_disposed() {
            *state = new_state;
        }
    }
}

impl fmt::Debug for PeerExchangeRequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerExchangeRequestHandler")
            .field("connection", &self.connection)
            .field("nonce", &self.nonce)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::{task, time};

    use super::*;
    use crate::{
        message::PeerExchangeResponse,
        test_utils::{
            make_address,
            make_peer,
            mocks::{create_mock_node, MockBehaviour},
        },
    };

    fn setup(behaviour: MockBehaviour) -> (Arc<PeerExchangeRequestHandler>, Connection) {
        let node = create_mock_node(make_address(1));
        node.get_shared_state().set_behaviour(make_address(2), behaviour);
        let connection = node.create_connection(make_address(2));
        let handler = PeerExchangeRequestHandler::new(
            Arc::new(node),
            connection.clone(),
            PeerExchangeMessageFactory::default(),
        );
        (Arc::new(handler), connection)
    }

    #[tokio::test]
    async fn it_resolves_with_the_response_peers() {
        let (handler, _conn) = setup(MockBehaviour::respond(vec![make_peer(10), make_peer(11)]));
        let peers = handler.request(vec![make_peer(3)]).await.unwrap();
        assert_eq!(peers, vec![make_peer(10), make_peer(11)]);
        assert_eq!(handler.state(), HandlerState::ResponseReceived);
        handler.dispose();
        assert_eq!(handler.state(), HandlerState::Disposed);
    }

    #[tokio::test]
    async fn it_ignores_mismatched_nonce() {
        let (handler, conn) = setup(MockBehaviour::Silent);
        let request = task::spawn({
            let handler = handler.clone();
            async move { handler.request(vec![]).await }
        });
        while handler.state() != HandlerState::RequestSent {
            task::yield_now().await;
        }

        let err = conn
            .dispatch_response(PeerExchangeResponse::new(handler.nonce().wrapping_add(1), vec![make_peer(20)]))
            .unwrap_err();
        assert!(err.is_protocol_mismatch());
        task::yield_now().await;
        assert!(!request.is_finished());
        assert_eq!(handler.state(), HandlerState::RequestSent);

        conn.dispatch_response(PeerExchangeResponse::new(handler.nonce(), vec![make_peer(21)]))
            .unwrap();
        let peers = request.await.unwrap().unwrap();
        assert_eq!(peers, vec![make_peer(21)]);

        // Resolves only once
        assert!(conn
            .dispatch_response(PeerExchangeResponse::new(handler.nonce(), vec![]))
            .is_err());
    }

    #[tokio::test]
    async fn it_fails_and_disposes_when_sending_fails() {
        let (handler, conn) = setup(MockBehaviour::FailSend);
        let err = handler.request(vec![]).await.unwrap_err();
        assert!(err.is_transport_failure());
        assert_eq!(handler.state(), HandlerState::Disposed);
        assert_eq!(conn.num_pending_responses(), 0);
    }

    #[tokio::test]
    async fn it_fails_when_the_connection_closes() {
        let (handler, conn) = setup(MockBehaviour::Silent);
        let request = task::spawn({
            let handler = handler.clone();
            async move { handler.request(vec![]).await }
        });
        while handler.state() != HandlerState::RequestSent {
            task::yield_now().await;
        }
        conn.close();
        let err = request.await.unwrap().unwrap_err();
        assert_eq!(err, PeerExchangeError::ConnectionClosed);
        assert_eq!(handler.state(), HandlerState::ConnectionClosed);

        let (handler, conn) = setup(MockBehaviour::Silent);
        conn.close();
        assert_eq!(handler.request(vec![]).await.unwrap_err(), PeerExchangeError::ConnectionClosed);
    }

    #[tokio::test]
    async fn dispose_cancels_the_request() {
        let (handler, conn) = setup(MockBehaviour::Silent);
        let request = task::spawn({
            let handler = handler.clone();
            async move { handler.request(vec![]).await }
        });
        while handler.state() != HandlerState::RequestSent {
            task::yield_now().await;
        }
        handler.dispose();
        handler.dispose();
        let err = time::timeout(Duration::from_secs(5), request)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(handler.state(), HandlerState::Disposed);
        assert_eq!(conn.num_pending_responses(), 0);

        // A disposed handler cannot be reused
        assert!(handler.request(vec![]).await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn it_rejects_oversized_peer_lists() {
        let node = create_mock_node(make_address(1));
        let connection = node.create_connection(make_address(2));
        let handler = PeerExchangeRequestHandler::new(
            Arc::new(node.clone()),
            connection,
            PeerExchangeMessageFactory::new(1).unwrap(),
        );
        let err = handler.request(vec![make_peer(3), make_peer(4)]).await.unwrap_err();
        assert!(err.is_precondition_violation());
        assert_eq!(handler.state(), HandlerState::Created);
        assert_eq!(node.get_shared_state().call_count(), 0);
    }
}
