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

use std::{fmt, sync::Arc, time::Duration};

use tokio::sync::broadcast;

use super::round::{RoundKind, RoundResult};

pub type PeerExchangeEventSender = broadcast::Sender<Arc<PeerExchangeEvent>>;
pub type PeerExchangeEventReceiver = broadcast::Receiver<Arc<PeerExchangeEvent>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerExchangeEvent {
    /// Every exchange attempt of the round has settled
    RoundCompleted { kind: RoundKind, result: RoundResult },
    /// The round did not release within the round timeout
    RoundTimedOut { kind: RoundKind },
    RetryScheduled { attempt: usize, delay: Duration },
    RetriesExhausted { attempts: usize },
    InitialPeerExchangeCompleted,
}

impl fmt::Display for PeerExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PeerExchangeEvent::*;
        match self {
            RoundCompleted { kind, result } => write!(f, "RoundCompleted({}, {})", kind, result),
            RoundTimedOut { kind } => write!(f, "RoundTimedOut({})", kind),
            RetryScheduled { attempt, delay } => write!(f, "RetryScheduled(attempt = {}, delay = {:.2?})", attempt, delay),
            RetriesExhausted { attempts } => write!(f, "RetriesExhausted({})", attempts),
            InitialPeerExchangeCompleted => write!(f, "InitialPeerExchangeCompleted"),
        }
    }
}
