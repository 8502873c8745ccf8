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
    cmp,
    fmt,
    sync::{atomic::Ordering, Arc, Mutex},
};

use futures::{stream::FuturesUnordered, StreamExt};
use log::*;
use tokio::{sync::oneshot, task, time};

use super::{PeerExchangeEvent, PeerExchangeService, LOG_TARGET};
use crate::{
    backoff::Backoff,
    connection::Connection,
    error::PeerExchangeError,
    peer::Address,
    request_handler::PeerExchangeRequestHandler,
    strategy::PeerExchangeStrategy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundKind {
    /// Bootstrap round started by `start_initial_peer_exchange` or `do_peer_exchange`
    Initial,
    /// Bootstrap round started after a backoff delay
    Retry,
    /// Round started by `extend_peer_group`. Never retried.
    Extension,
}

impl RoundKind {
    pub fn is_bootstrap(self) -> bool {
        matches!(self, RoundKind::Initial | RoundKind::Retry)
    }
}

impl fmt::Display for RoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundKind::Initial => write!(f, "initial"),
            RoundKind::Retry => write!(f, "retry"),
            RoundKind::Extension => write!(f, "extension"),
        }
    }
}

/// Tally of the exchange attempts of a round. Each settled attempt produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    pub num_candidates: usize,
    pub min_success: usize,
    pub num_success: usize,
    pub num_failures: usize,
}

impl RoundResult {
    pub fn new(num_candidates: usize, min_success: usize) -> Self {
        Self {
            num_candidates,
            min_success,
            num_success: 0,
            num_failures: 0,
        }
    }

    #[must_use]
    pub fn record(self, is_success: bool) -> Self {
        if is_success {
            Self {
                num_success: self.num_success + 1,
                ..self
            }
        } else {
            Self {
                num_failures: self.num_failures + 1,
                ..self
            }
        }
    }

    pub fn num_settled(&self) -> usize {
        self.num_success + self.num_failures
    }

    pub fn is_settled(&self) -> bool {
        self.num_settled() == self.num_candidates
    }

    pub fn min_success_reached(&self) -> bool {
        self.num_success >= self.min_success
    }
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} succeeded, {} failed, min success {}",
            self.num_success, self.num_candidates, self.num_failures, self.min_success
        )
    }
}

/// The reason the caller of a round resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundRelease {
    /// No round was started
    Skipped,
    /// The minimum number of successful exchanges was reached. Remaining attempts continue in the background.
    MinSuccessReached(RoundResult),
    /// Every attempt settled without reaching the minimum number of successful exchanges
    Settled(RoundResult),
    /// The round did not release within the round timeout
    TimedOut,
    /// The round task ended without releasing
    Aborted,
}

impl RoundRelease {
    is_fn!(is_skipped, RoundRelease::Skipped);

    is_fn!(is_timed_out, RoundRelease::TimedOut);

    pub fn result(&self) -> Option<&RoundResult> {
        match self {
            RoundRelease::MinSuccessReached(result) | RoundRelease::Settled(result) => Some(result),
            _ => None,
        }
    }
}

/// Holds the sender that releases the caller of a round. Whichever of the round and the round timeout takes the sender
/// first decides whether the round released or timed out.
type ReleaseSlot = Arc<Mutex<Option<oneshot::Sender<RoundRelease>>>>;

/// Releases the caller of the round. Returns false if the round timeout already claimed the release.
fn release_round(slot: &ReleaseSlot, release: RoundRelease) -> bool {
    match acquire_lock!(slot).take() {
        Some(tx) => {
            let _result = tx.send(release);
            true
        },
        None => false,
    }
}

impl PeerExchangeService {
    pub(super) async fn run_round(&self, kind: RoundKind, candidates: Vec<Address>, min_success: usize) -> RoundRelease {
        if self.is_shutdown() {
            debug!(target: LOG_TARGET, "Not starting {} round because we are shutting down", kind);
            return RoundRelease::Skipped;
        }
        if candidates.is_empty() {
            debug!(target: LOG_TARGET, "No candidates for {} round", kind);
            return RoundRelease::Skipped;
        }

        let min_success = cmp::min(min_success, candidates.len());
        info!(
            target: LOG_TARGET,
            "Starting {} peer exchange round with {} candidate(s). Waiting for {} successful exchange(s)",
            kind,
            candidates.len(),
            min_success
        );

        let (release_tx, mut release_rx) = oneshot::channel();
        let release_slot: ReleaseSlot = Arc::new(Mutex::new(Some(release_tx)));
        task::spawn(
            self.clone()
                .execute_round(kind, candidates, min_success, release_slot.clone()),
        );

        match time::timeout(self.config.round_timeout, &mut release_rx).await {
            Ok(Ok(release)) => release,
            Ok(Err(_)) => {
                warn!(target: LOG_TARGET, "The {} round ended without releasing", kind);
                RoundRelease::Aborted
            },
            Err(_) => {
                let is_timeout_claimed = acquire_lock!(release_slot).take().is_some();
                if !is_timeout_claimed {
                    // The round released as the timeout elapsed
                    return release_rx.await.unwrap_or(RoundRelease::Aborted);
                }
                if kind == RoundKind::Retry {
                    self.state.retry_in_progress.store(false, Ordering::SeqCst);
                }
                self.on_round_timeout(kind, min_success);
                RoundRelease::TimedOut
            },
        }
    }

    async fn execute_round(
        self,
        kind: RoundKind,
        candidates: Vec<Address>,
        min_success: usize,
        release_slot: ReleaseSlot,
    ) {
        let mut attempts = candidates
            .into_iter()
            .map(|address| {
                let service = self.clone();
                task::spawn(async move {
                    let result = service.exchange_with(&address).await;
                    (address, result)
                })
            })
            .collect::<FuturesUnordered<_>>();

        let mut result = RoundResult::new(attempts.len(), min_success);
        let mut is_released = false;
        while let Some(joined) = attempts.next().await {
            let is_success = match joined {
                Ok((address, Ok(num_peers))) => {
                    debug!(
                        target: LOG_TARGET,
                        "Peer exchange with `{}` succeeded. {} peer(s) merged", address, num_peers
                    );
                    true
                },
                Ok((address, Err(err))) => {
                    debug!(target: LOG_TARGET, "Peer exchange with `{}` failed: {}", address, err);
                    false
                },
                Err(err) => {
                    error!(target: LOG_TARGET, "Peer exchange attempt task failed: {}", err);
                    false
                },
            };
            result = result.record(is_success);

            if !is_released && result.num_success == min_success {
                debug!(
                    target: LOG_TARGET,
                    "{} round reached {} successful exchange(s)", kind, min_success
                );
                is_released = release_round(&release_slot, RoundRelease::MinSuccessReached(result));
            }
        }

        if !is_released {
            is_released = release_round(&release_slot, RoundRelease::Settled(result));
        }
        let timed_out = !is_released;

        info!(target: LOG_TARGET, "Completed {} peer exchange round: {}", kind, result);
        match kind {
            RoundKind::Extension => self.state.extension_in_progress.store(false, Ordering::SeqCst),
            // A timed out retry round released the flag when it timed out
            RoundKind::Retry if !timed_out => self.state.retry_in_progress.store(false, Ordering::SeqCst),
            _ => {},
        }
        self.publish_event(PeerExchangeEvent::RoundCompleted { kind, result });

        if timed_out {
            debug!(
                target: LOG_TARGET,
                "The {} round timed out before it completed. A retry has already been handled", kind
            );
            return;
        }
        self.evaluate_round(kind, result);
    }

    /// A single exchange with `address`. Returns the number of peers merged from the response.
    async fn exchange_with(&self, address: &Address) -> Result<usize, PeerExchangeError> {
        let connection = self.dial(address).await?;
        let handler = self.register_handler(&connection)?;

        let my_peers = self.strategy.peers_for_reporting(address);
        let result = match time::timeout(self.config.response_timeout, handler.request(my_peers)).await {
            Ok(result) => result,
            Err(_) => Err(PeerExchangeError::ResponseTimeout(self.config.response_timeout)),
        };
        self.unregister_handler(&connection, &handler);
        handler.dispose();

        let peers = result?;
        if self.is_shutdown() {
            return Err(PeerExchangeError::ShuttingDown);
        }
        self.message_factory.validate_peers(&peers)?;
        Ok(self.strategy.add_reported_peers(peers, address))
    }

    async fn dial(&self, address: &Address) -> Result<Connection, PeerExchangeError> {
        let mut shutdown_signal = self.state.shutdown.to_signal();
        tokio::select! {
            biased;

            _ = shutdown_signal.wait() => Err(PeerExchangeError::ShuttingDown),
            result = time::timeout(self.config.dial_timeout, self.node.get_connection(address)) => match result {
                Ok(result) => result,
                Err(_) => Err(PeerExchangeError::DialTimeout(address.clone())),
            },
        }
    }

    fn register_handler(&self, connection: &Connection) -> Result<Arc<PeerExchangeRequestHandler>, PeerExchangeError> {
        let mut handlers = acquire_lock!(self.state.handlers);
        // Checked under the lock so that shutdown cannot miss a handler being registered
        if self.is_shutdown() {
            return Err(PeerExchangeError::ShuttingDown);
        }
        if handlers.contains_key(&connection.id()) {
            warn!(
                target: LOG_TARGET,
                "A peer exchange request is already pending on {}", connection
            );
            return Err(PeerExchangeError::DuplicateRequest(connection.id()));
        }
        let handler = Arc::new(PeerExchangeRequestHandler::new(
            self.node.clone(),
            connection.clone(),
            self.message_factory,
        ));
        handlers.insert(connection.id(), handler.clone());
        Ok(handler)
    }

    fn unregister_handler(&self, connection: &Connection, handler: &Arc<PeerExchangeRequestHandler>) {
        let mut handlers = acquire_lock!(self.state.handlers);
        if handlers
            .get(&connection.id())
            .map(|h| Arc::ptr_eq(h, handler))
            .unwrap_or(false)
        {
            handlers.remove(&connection.id());
        }
    }

    fn evaluate_round(&self, kind: RoundKind, result: RoundResult) {
        if self.is_shutdown() {
            return;
        }
        if !kind.is_bootstrap() {
            return;
        }
        if self.is_initial_exchange_completed() {
            debug!(
                target: LOG_TARGET,
                "Initial peer exchange already completed. Ignoring the outcome of the {} round", kind
            );
            return;
        }

        let too_many_failures = PeerExchangeStrategy::too_many_failures(result.num_success, result.num_failures);
        let needs_more_connections = self.strategy.needs_more_connections();
        let needs_more_reported_peers = self.strategy.needs_more_reported_peers();
        let min_success_reached = result.min_success_reached();
        if too_many_failures || needs_more_connections || needs_more_reported_peers || !min_success_reached {
            debug!(
                target: LOG_TARGET,
                "Peer exchange requires a retry (too_many_failures = {}, needs_more_connections = {}, \
                 needs_more_reported_peers = {}, min_success_reached = {})",
                too_many_failures,
                needs_more_connections,
                needs_more_reported_peers,
                min_success_reached
            );
            self.schedule_retry(result.min_success);
        } else {
            self.complete_initial_exchange(result);
        }
    }

    fn complete_initial_exchange(&self, result: RoundResult) {
        self.state.num_retry_attempts.store(0, Ordering::SeqCst);
        self.cancel_retry_timer();
        if self.state.initial_exchange_completed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: LOG_TARGET, "Initial peer exchange completed ({})", result);
        self.publish_event(PeerExchangeEvent::InitialPeerExchangeCompleted);

        if result.num_candidates < self.strategy.min_num_connected_peers() {
            debug!(
                target: LOG_TARGET,
                "Bootstrapped from only {} candidate(s). Extending the peer group", result.num_candidates
            );
            let service = self.clone();
            task::spawn(async move {
                service.extend_peer_group().await;
            });
        }
    }

    fn on_round_timeout(&self, kind: RoundKind, min_success: usize) {
        warn!(
            target: LOG_TARGET,
            "{} ({} round)",
            PeerExchangeError::RoundTimeout(self.config.round_timeout),
            kind
        );
        self.publish_event(PeerExchangeEvent::RoundTimedOut { kind });
        if self.is_shutdown() || !kind.is_bootstrap() {
            return;
        }
        // Cached peers may be stale
        self.strategy.clear_persisted_peers();
        self.strategy.clear_reported_peers();
        self.schedule_retry(min_success);
    }

    pub(super) fn schedule_retry(&self, min_success: usize) {
        if self.is_shutdown() {
            return;
        }
        if self.state.retry_in_progress.load(Ordering::SeqCst) {
            debug!(target: LOG_TARGET, "A retry round is in progress. Not scheduling another retry");
            return;
        }
        if self.has_pending_retry() {
            debug!(target: LOG_TARGET, "A retry is already pending");
            return;
        }
        let attempt = self.state.num_retry_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(max_attempts) = self.config.max_retry_attempts {
            if attempt > max_attempts {
                warn!(
                    target: LOG_TARGET,
                    "Giving up on peer exchange after {} retry attempt(s)", max_attempts
                );
                self.cancel_retry_timer();
                self.publish_event(PeerExchangeEvent::RetriesExhausted { attempts: max_attempts });
                return;
            }
        }

        let delay = self.backoff.calculate_backoff(attempt);
        let service = self.clone();
        let timer = task::spawn(async move {
            time::sleep(delay).await;
            if service.is_shutdown() {
                return;
            }
            // Fired, so no longer pending
            drop(acquire_lock!(service.state.retry_timer).take());
            // The retry runs detached from the timer so that scheduling the next retry cannot abort it
            task::spawn(async move {
                service.retry_peer_exchange(min_success).await;
            });
        });

        {
            let mut retry_timer = acquire_lock!(self.state.retry_timer);
            if self.is_shutdown() {
                timer.abort();
                return;
            }
            if let Some(previous) = retry_timer.replace(timer) {
                previous.abort();
            }
        }
        info!(
            target: LOG_TARGET,
            "Retrying peer exchange in {:.2?} (attempt {})", delay, attempt
        );
        self.publish_event(PeerExchangeEvent::RetryScheduled { attempt, delay });
    }

    async fn retry_peer_exchange(&self, min_success: usize) -> RoundRelease {
        if self.is_initial_exchange_completed() {
            return RoundRelease::Skipped;
        }
        if self.state.retry_in_progress.swap(true, Ordering::SeqCst) {
            debug!(target: LOG_TARGET, "A retry round is already in progress");
            return RoundRelease::Skipped;
        }
        let candidates = self.strategy.addresses_for_retry_peer_exchange();
        let release = self.run_round(RoundKind::Retry, candidates, min_success).await;
        if matches!(release, RoundRelease::Skipped | RoundRelease::Aborted) {
            self.state.retry_in_progress.store(false, Ordering::SeqCst);
        }
        if release.is_skipped() && !self.is_shutdown() {
            debug!(target: LOG_TARGET, "No candidates to retry with");
            self.schedule_retry(min_success);
        }
        release
    }
}
