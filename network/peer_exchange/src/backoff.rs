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

pub type BoxedBackoff = Box<dyn Backoff + Send + Sync>;

pub trait Backoff {
    fn calculate_backoff(&self, attempts: usize) -> Duration;
}

impl Backoff for BoxedBackoff {
    fn calculate_backoff(&self, attempts: usize) -> Duration {
        (**self).calculate_backoff(attempts)
    }
}

/// Doubles the delay on every attempt starting from `base`, never exceeding `max_delay`.
///
/// `delay(n) = min(max_delay, base * 2^(n-1))` and `delay(0) = 0`
#[derive(Debug, Clone)]
pub struct CappedExponentialBackoff {
    base: Duration,
    max_delay: Duration,
}

impl CappedExponentialBackoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }
}

impl Default for CappedExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(20))
    }
}

impl Backoff for CappedExponentialBackoff {
    fn calculate_backoff(&self, attempts: usize) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exp = u32::try_from(attempts - 1).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_backoff() {
        let backoff = CappedExponentialBackoff::default();
        assert_eq!(backoff.calculate_backoff(0).as_secs(), 0);
        assert_eq!(backoff.calculate_backoff(1).as_secs(), 1);
        assert_eq!(backoff.calculate_backoff(2).as_secs(), 2);
        assert_eq!(backoff.calculate_backoff(3).as_secs(), 4);
        assert_eq!(backoff.calculate_backoff(4).as_secs(), 8);
        assert_eq!(backoff.calculate_backoff(5).as_secs(), 16);
        assert_eq!(backoff.calculate_backoff(6).as_secs(), 20);
        assert_eq!(backoff.calculate_backoff(100).as_secs(), 20);
        assert_eq!(backoff.calculate_backoff(usize::MAX).as_secs(), 20);
    }

    #[test]
    fn it_is_non_decreasing_and_capped() {
        let backoff = CappedExponentialBackoff::new(Duration::from_millis(300), Duration::from_secs(60));
        let delays = (0..64).map(|n| backoff.calculate_backoff(n)).collect::<Vec<_>>();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(60)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn zero_backoff() {
        let backoff = CappedExponentialBackoff::new(Duration::ZERO, Duration::from_secs(20));
        assert_eq!(backoff.calculate_backoff(0).as_secs(), 0);
        assert_eq!(backoff.calculate_backoff(1).as_secs(), 0);
        assert_eq!(backoff.calculate_backoff(200).as_secs(), 0);
    }
}
