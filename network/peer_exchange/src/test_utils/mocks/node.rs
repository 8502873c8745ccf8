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
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{task, time};

use crate::{
    connection::{Connection, ConnectionId},
    error::PeerExchangeError,
    message::{PeerExchangeMessage, PeerExchangeResponse},
    node::Node,
    peer::{Address, Peer},
};

pub fn create_mock_node(address: Address) -> MockNode {
    MockNode::new(address)
}

/// How the mocked remote node at an address behaves
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Responds to requests with `peers` after `delay`
    Respond { peers: Vec<Peer>, delay: Duration },
    /// Dialing fails after `delay`
    FailDial { delay: Duration },
    /// Sending a message fails
    FailSend,
    /// Accepts requests but never responds
    Silent,
    /// Closes the connection `delay` after receiving a request
    CloseConnection { delay: Duration },
}

impl MockBehaviour {
    pub fn respond(peers: Vec<Peer>) -> Self {
        MockBehaviour::Respond {
            peers,
            delay: Duration::ZERO,
        }
    }

    pub fn respond_after(delay: Duration, peers: Vec<Peer>) -> Self {
        MockBehaviour::Respond { peers, delay }
    }

    pub fn fail_dial_after(delay: Duration) -> Self {
        MockBehaviour::FailDial { delay }
    }
}

#[derive(Debug)]
struct State {
    calls: Vec<String>,
    behaviours: HashMap<Address, MockBehaviour>,
    default_behaviour: MockBehaviour,
    connections: HashMap<Address, Connection>,
    sent_messages: Vec<(Address, PeerExchangeMessage)>,
    num_connections: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            behaviours: HashMap::new(),
            default_behaviour: MockBehaviour::Silent,
            connections: HashMap::new(),
            sent_messages: Vec::new(),
            num_connections: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockNodeState {
    inner: Arc<Mutex<State>>,
}

impl MockNodeState {
    pub fn set_behaviour(&self, address: Address, behaviour: MockBehaviour) {
        self.with_state(|state| {
            state.behaviours.insert(address, behaviour);
        })
    }

    pub fn set_default_behaviour(&self, behaviour: MockBehaviour) {
        self.with_state(|state| {
            state.default_behaviour = behaviour;
        })
    }

    pub fn set_num_connections(&self, num_connections: usize) {
        self.with_state(|state| {
            state.num_connections = num_connections;
        })
    }

    pub fn call_count(&self) -> usize {
        self.with_state(|state| state.calls.len())
    }

    pub fn take_calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.drain(..).collect())
    }

    pub fn count_calls_containing(&self, pat: &str) -> usize {
        self.with_state(|state| state.calls.iter().filter(|s| s.contains(pat)).count())
    }

    pub fn sent_messages(&self) -> Vec<(Address, PeerExchangeMessage)> {
        self.with_state(|state| state.sent_messages.clone())
    }

    pub fn get_connection(&self, address: &Address) -> Option<Connection> {
        self.with_state(|state| state.connections.get(address).cloned())
    }

    /// Waits until at least `count` calls containing `pat` were made
    pub async fn await_calls_containing(&self, pat: &str, count: usize) {
        let mut attempts = 0;
        while self.count_calls_containing(pat) < count {
            attempts += 1;
            assert!(
                attempts <= 100,
                "expected {} call(s) containing '{}' within 10 seconds but got {}",
                count,
                pat,
                self.count_calls_containing(pat)
            );
            time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn add_call(&self, call: String) {
        self.with_state(|state| state.calls.push(call))
    }

    fn behaviour_for(&self, address: &Address) -> MockBehaviour {
        self.with_state(|state| {
            state
                .behaviours
                .get(address)
                .cloned()
                .unwrap_or_else(|| state.default_behaviour.clone())
        })
    }

    fn with_state<F, R>(&self, f: F) -> R
    where F: FnOnce(&mut State) -> R {
        let mut lock = self.inner.lock().unwrap();
        (f)(&mut lock)
    }
}

/// A `Node` whose remote peers follow scripted `MockBehaviour`s. Unscripted addresses are `Silent`.
#[derive(Debug, Clone)]
pub struct MockNode {
    address: Address,
    state: MockNodeState,
}

impl MockNode {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            state: MockNodeState::default(),
        }
    }

    pub fn get_shared_state(&self) -> MockNodeState {
        self.state.clone()
    }

    /// Returns the open connection to `address`, creating one if necessary
    pub fn create_connection(&self, address: Address) -> Connection {
        self.state.with_state(|state| {
            let conn = state
                .connections
                .entry(address.clone())
                .or_insert_with(|| Connection::new(ConnectionId::next(), address.clone()));
            if conn.is_closed() {
                *conn = Connection::new(ConnectionId::next(), address);
            }
            conn.clone()
        })
    }
}

#[async_trait]
impl Node for MockNode {
    fn not_myself(&self, address: &Address) -> bool {
        *address != self.address
    }

    async fn get_connection(&self, address: &Address) -> Result<Connection, PeerExchangeError> {
        self.state.add_call(format!("get_connection {}", address));
        if let MockBehaviour::FailDial { delay } = self.state.behaviour_for(address) {
            time::sleep(delay).await;
            return Err(PeerExchangeError::DialFailed {
                address: address.clone(),
                details: "mock dial failure".to_string(),
            });
        }
        Ok(self.create_connection(address.clone()))
    }

    async fn send(&self, message: PeerExchangeMessage, connection: &Connection) -> Result<(), PeerExchangeError> {
        let address = connection.peer_address().clone();
        self.state.add_call(format!("send {} to {}", message, address));
        let behaviour = self.state.behaviour_for(&address);
        if let MockBehaviour::FailSend = behaviour {
            return Err(PeerExchangeError::SendFailed("mock send failure".to_string()));
        }
        self.state
            .with_state(|state| state.sent_messages.push((address, message.clone())));

        let request = match message {
            PeerExchangeMessage::Request(request) => request,
            PeerExchangeMessage::Response(_) => return Ok(()),
        };
        let connection = connection.clone();
        match behaviour {
            MockBehaviour::Respond { peers, delay } => {
                task::spawn(async move {
                    time::sleep(delay).await;
                    let _result = connection.dispatch_response(PeerExchangeResponse::new(request.nonce(), peers));
                });
            },
            MockBehaviour::CloseConnection { delay } => {
                task::spawn(async move {
                    time::sleep(delay).await;
                    connection.close();
                });
            },
            MockBehaviour::Silent | MockBehaviour::FailDial { .. } | MockBehaviour::FailSend => {},
        }
        Ok(())
    }

    fn num_connections(&self) -> usize {
        self.state.with_state(|state| state.num_connections)
    }
}
