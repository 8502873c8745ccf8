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

use std::sync::Arc;

use tokio::sync::watch;

/// Trigger for shutting down the peer exchange. All `ShutdownSignal`s obtained from this instance resolve once
/// `trigger` is called.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger the shutdown. Returns true if this call triggered it, false if it was already triggered.
    pub fn trigger(&self) -> bool {
        self.sender.send_if_modified(|is_triggered| {
            if *is_triggered {
                false
            } else {
                *is_triggered = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn to_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when the shutdown is triggered
    pub async fn wait(&mut self) {
        // The sender lives as long as the `Shutdown`. If it is dropped the signal will never fire, so we wait forever.
        if self.receiver.wait_for(|is_triggered| *is_triggered).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time;

    use super::*;

    #[tokio::test]
    async fn it_signals_all_receivers() {
        let shutdown = Shutdown::new();
        let mut signal1 = shutdown.to_signal();
        let mut signal2 = signal1.clone();
        assert!(!signal1.is_triggered());

        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());

        time::timeout(Duration::from_secs(1), signal1.wait()).await.unwrap();
        time::timeout(Duration::from_secs(1), signal2.wait()).await.unwrap();
        assert!(signal2.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn it_does_not_resolve_before_trigger() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.to_signal();
        assert!(time::timeout(Duration::from_secs(10), signal.wait()).await.is_err());
        drop(shutdown);
        assert!(time::timeout(Duration::from_secs(10), signal.wait()).await.is_err());
    }
}
