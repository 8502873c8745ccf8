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

//! # Peer exchange service
//!
//! Coordinates rounds of peer exchange. A round sends a request to each candidate address concurrently and merges the
//! peers received in the responses. The caller of a round resumes as soon as the minimum number of exchanges
//! succeeded, or every exchange settled, or the round timeout elapsed, whichever happens first.
//!
//! Once every exchange of a bootstrap round has settled, the outcome is evaluated. If too many exchanges failed or the
//! node still needs more connections or reported peers, a retry round is scheduled with an exponentially increasing
//! delay. Otherwise the initial peer exchange is complete and the peer group may be extended with
//! `extend_peer_group`.
//!
//! Inbound requests are answered by the passive responder (`handle_message`).

mod event;
pub use event::{PeerExchangeEvent, PeerExchangeEventReceiver, PeerExchangeEventSender};

mod responder;

mod round;
pub use round::{RoundKind, RoundRelease, RoundResult};


use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use log::*;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    backoff::{BoxedBackoff, CappedExponentialBackoff},
    config::PeerExchangeConfig,
    connection::ConnectionId,
    consts::EVENT_CHANNEL_SIZE,
    error::PeerExchangeError,
    message::PeerExchangeMessageFactory,
    node::Node,
    peer::Address,
    peer_group::PeerGroup,
    request_handler::PeerExchangeRequestHandler,
    shutdown::Shutdown,
    strategy::PeerExchangeStrategy,
};

const LOG_TARGET: &str = "network::peer_exchange::service";

/// Handle to the peer exchange. Cloning the handle is cheap and all clones share the same state.
#[derive(Clone)]
pub struct PeerExchangeService {
    config: Arc<PeerExchangeConfig>,
    node: Arc<dyn Node>,
    strategy: Arc<PeerExchangeStrategy>,
    message_factory: PeerExchangeMessageFactory,
    backoff: Arc<BoxedBackoff>,
    state: Arc<ServiceState>,
    event_tx: PeerExchangeEventSender,
}

struct ServiceState {
    shutdown: Shutdown,
    initial_exchange_completed: AtomicBool,
    extension_in_progress: AtomicBool,
    retry_in_progress: AtomicBool,
    num_retry_attempts: AtomicUsize,
    handlers: Mutex<HashMap<ConnectionId, Arc<PeerExchangeRequestHandler>>>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
}

impl PeerExchangeService {
    pub fn new(
        config: PeerExchangeConfig,
        node: Arc<dyn Node>,
        peer_group: Arc<dyn PeerGroup>,
    ) -> Result<Self, PeerExchangeError> {
        let backoff = CappedExponentialBackoff::new(config.retry_base_delay, config.max_retry_delay);
        Self::with_backoff(config, node, peer_group, Box::new(backoff))
    }

    pub fn with_backoff(
        config: PeerExchangeConfig,
        node: Arc<dyn Node>,
        peer_group: Arc<dyn PeerGroup>,
        backoff: BoxedBackoff,
    ) -> Result<Self, PeerExchangeError> {
        config.validate()?;
        let message_factory = PeerExchangeMessageFactory::new(config.max_num_peers)?;
        let strategy = PeerExchangeStrategy::new(config.clone(), node.clone(), peer_group);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Ok(Self {
            config: Arc::new(config),
            node,
            strategy: Arc::new(strategy),
            message_factory,
            backoff: Arc::new(backoff),
            state: Arc::new(ServiceState {
                shutdown: Shutdown::new(),
                initial_exchange_completed: AtomicBool::new(false),
                extension_in_progress: AtomicBool::new(false),
                retry_in_progress: AtomicBool::new(false),
                num_retry_attempts: AtomicUsize::new(0),
                handlers: Mutex::new(HashMap::new()),
                retry_timer: Mutex::new(None),
            }),
            event_tx,
        })
    }

    pub fn config(&self) -> &PeerExchangeConfig {
        &self.config
    }

    pub fn strategy(&self) -> &PeerExchangeStrategy {
        &self.strategy
    }

    pub fn subscribe_events(&self) -> PeerExchangeEventReceiver {
        self.event_tx.subscribe()
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.shutdown.is_triggered()
    }

    pub fn is_initial_exchange_completed(&self) -> bool {
        self.state.initial_exchange_completed.load(Ordering::SeqCst)
    }

    /// The number of exchanges currently awaiting a response
    pub fn num_pending_requests(&self) -> usize {
        acquire_lock!(self.state.handlers).len()
    }

    pub fn has_pending_retry(&self) -> bool {
        acquire_lock!(self.state.retry_timer)
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Consecutive retries since the last successful bootstrap round
    pub fn num_retry_attempts(&self) -> usize {
        self.state.num_retry_attempts.load(Ordering::SeqCst)
    }

    /// Runs the bootstrap round. Resolves once `min_success` exchanges succeeded or all exchanges settled. Does
    /// nothing if the initial peer exchange has already completed.
    pub async fn start_initial_peer_exchange(&self, min_success: usize) -> Result<RoundRelease, PeerExchangeError> {
        if min_success == 0 {
            return Err(PeerExchangeError::InvalidMinSuccess);
        }
        if self.is_initial_exchange_completed() {
            debug!(target: LOG_TARGET, "Initial peer exchange has already completed");
            return Ok(RoundRelease::Skipped);
        }
        let candidates = self.strategy.addresses_for_initial_peer_exchange();
        Ok(self.run_round(RoundKind::Initial, candidates, min_success).await)
    }

    /// Exchanges with peers we have not used yet to grow the peer group. Only runs after the initial peer exchange
    /// has completed, and not while another extension round is running.
    pub async fn extend_peer_group(&self) -> RoundRelease {
        if !self.is_initial_exchange_completed() {
            debug!(
                target: LOG_TARGET,
                "Not extending the peer group because the initial peer exchange has not completed"
            );
            return RoundRelease::Skipped;
        }
        if self.state.extension_in_progress.swap(true, Ordering::SeqCst) {
            debug!(target: LOG_TARGET, "Peer group extension is already in progress");
            return RoundRelease::Skipped;
        }
        let candidates = self.strategy.addresses_for_extending_peer_group();
        let release = self.run_round(RoundKind::Extension, candidates, 1).await;
        if matches!(release, RoundRelease::Skipped | RoundRelease::Aborted) {
            self.state.extension_in_progress.store(false, Ordering::SeqCst);
        }
        release
    }

    /// Runs a bootstrap round with the given candidates
    pub async fn do_peer_exchange(
        &self,
        candidates: Vec<Address>,
        min_success: usize,
    ) -> Result<RoundRelease, PeerExchangeError> {
        if min_success == 0 {
            return Err(PeerExchangeError::InvalidMinSuccess);
        }
        Ok(self.run_round(RoundKind::Initial, candidates, min_success).await)
    }

    /// Stops all peer exchange activity. Pending requests are cancelled and no further rounds or retries are
    /// started. Calling this more than once has no effect.
    pub fn shutdown(&self) {
        if !self.state.shutdown.trigger() {
            return;
        }
        info!(target: LOG_TARGET, "Shutting down peer exchange");
        self.cancel_retry_timer();
        let handlers = acquire_lock!(self.state.handlers)
            .drain()
            .map(|(_, handler)| handler)
            .collect::<Vec<_>>();
        for handler in &handlers {
            handler.dispose();
        }
        debug!(
            target: LOG_TARGET,
            "Disposed {} pending request handler(s)",
            handlers.len()
        );
    }

    fn publish_event(&self, event: PeerExchangeEvent) {
        trace!(target: LOG_TARGET, "Publishing event {}", event);
        // No subscribers is fine
        let _result = self.event_tx.send(Arc::new(event));
    }

    fn cancel_retry_timer(&self) {
        if let Some(timer) = acquire_lock!(self.state.retry_timer).take() {
            timer.abort();
        }
    }
}
