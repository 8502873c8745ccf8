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

macro_rules! recover_lock {
    ($e:expr) => {
        match $e {
            Ok(lock) => lock,
            Err(poisoned) => {
                log::warn!(
                    target: "network::peer_exchange",
                    "Lock has been POISONED and will be silently recovered"
                );
                poisoned.into_inner()
            },
        }
    };
}

macro_rules! acquire_lock {
    ($e:expr, $m:ident) => {
        recover_lock!($e.$m())
    };
    ($e:expr) => {
        recover_lock!($e.lock())
    };
}

macro_rules! acquire_read_lock {
    ($e:expr) => {
        acquire_lock!($e, read)
    };
}

macro_rules! acquire_write_lock {
    ($e:expr) => {
        acquire_lock!($e, write)
    };
}

/// Log an error if an `Err` is returned from the `$expr`. If the given expression is `Ok(v)`,
/// `Some(v)` is returned, otherwise `None` is returned (same as `Result::ok`).
macro_rules! log_if_error {
    (level:$level:ident, target:$target:expr, $expr:expr, $msg:expr $(, $args:expr)* $(,)?) => {{
        match $expr {
            Ok(v) => Some(v),
            Err(err) => {
                log::$level!(target: $target, $msg, $($args,)* err);
                None
            },
        }
    }};
    (target:$target:expr, $expr:expr, $msg:expr $(, $args:expr)* $(,)?) => {{
        log_if_error!(level:warn, target:$target, $expr, $msg $(, $args)*)
    }};
}

macro_rules! is_fn {
    (
        $(#[$outer:meta])*
        $name: ident, $($enum_key:ident)::+
    ) => {
        $(#[$outer])*
        pub fn $name(&self) -> bool {
            matches!(self, $($enum_key)::+)
        }
    };
    (
        $(#[$outer:meta])*
        $name: ident, $($enum_key:ident)::+ { .. }
    ) => {
        $(#[$outer])*
        pub fn $name(&self) -> bool {
            matches!(self, $($enum_key)::+ { .. })
        }
    };
    (
        $(#[$outer:meta])*
        $name: ident, $($enum_key:ident)::+ ( .. )
    ) => {
        $(#[$outer])*
        pub fn $name(&self) -> bool {
            matches!(self, $($enum_key)::+ ( .. ))
        }
    };
}
