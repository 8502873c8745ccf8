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

use log::*;
use tokio::task;

use super::{PeerExchangeService, LOG_TARGET};
use crate::{
    connection::Connection,
    message::{PeerExchangeMessage, PeerExchangeRequest},
};

impl PeerExchangeService {
    /// Entry point for peer exchange messages received from the transport. Requests are answered, responses are
    /// routed to the request waiting on the connection.
    pub fn handle_message(&self, message: PeerExchangeMessage, connection: &Connection) {
        match message {
            PeerExchangeMessage::Request(request) => self.on_inbound_request(request, connection),
            // Response peer lists are validated by the exchange that receives them
            PeerExchangeMessage::Response(response) => {
                if let Err(err) = connection.dispatch_response(response) {
                    debug!(target: LOG_TARGET, "Discarding response from {}: {}", connection, err);
                }
            },
        }
    }

    /// Answers a peer exchange request with the peers we report to the requester, and merges the peers the requester
    /// sent us. The response is sent in the background. Requests with too many peers are discarded. Transports that
    /// decode requests themselves may call this directly instead of `handle_message`.
    pub fn on_inbound_request(&self, request: PeerExchangeRequest, connection: &Connection) {
        if self.is_shutdown() {
            debug!(
                target: LOG_TARGET,
                "Ignoring peer exchange request from {} because we are shutting down", connection
            );
            return;
        }
        if let Err(err) = self.message_factory.validate_peers(request.peers()) {
            warn!(
                target: LOG_TARGET,
                "Discarding peer exchange request from {}: {}", connection, err
            );
            return;
        }

        let requester = connection.peer_address().clone();
        let nonce = request.nonce();
        // Computed before merging so that the requester's own peers are not echoed back
        let my_peers = self.strategy.peers_for_reporting(&requester);
        self.strategy.add_reported_peers(request.into_peers(), &requester);

        let response = match self.message_factory.create_response(nonce, my_peers) {
            Ok(response) => response,
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    "Failed to create peer exchange response for {}: {}", connection, err
                );
                return;
            },
        };
        debug!(
            target: LOG_TARGET,
            "Responding to peer exchange request (nonce = {}) from {} with {} peer(s)",
            nonce,
            connection,
            response.peers().len()
        );

        let node = self.node.clone();
        let connection = connection.clone();
        task::spawn(async move {
            log_if_error!(
                target: LOG_TARGET,
                node.send(response.into(), &connection).await,
                "Failed to send peer exchange response to {}: {}",
                connection,
            );
        });
    }
}
