// BSD 3-Clause License
// Copyright (c) 2026, Virtual Cable S.L.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice,
//    this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice,
//    this list of conditions and the following disclaimer in the documentation
//    and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors
//    may be used to endorse or promote products derived from this software
//    without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
// AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
// FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
// CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
// OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

pub mod tcp;

#[cfg(feature = "kcp")]
pub mod kcp;
#[cfg(feature = "quic")]
pub mod quic;
#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "httppoll")]
pub mod httppoll;

use std::time::Duration;

use shared::errors::ClientError;

use crate::protocol::package_stream::PackageStream;

/// An endpoint the auto-connector can probe. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub protocol: String,
    pub address: String,
}

impl ServerEndpoint {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        ServerEndpoint {
            protocol: protocol.into(),
            address: address.into(),
        }
    }
}

/// Grace period before the low-priority tail of [`default_endpoints`] is
/// allowed to start probing, giving the stream-protocol entries a head
/// start.
pub const LOW_PRIORITY_GRACE: Duration = Duration::from_secs(2);

/// Number of leading entries in [`default_endpoints`] considered
/// high-priority (started immediately, no grace period).
pub const HIGH_PRIORITY_COUNT: usize = 3;

/// Default, priority-ordered probe list: `quic`, `tcp`, `websocket`,
/// `httppoll`. `httppoll` is the sole low-priority (grace-delayed) entry.
pub fn default_endpoints() -> Vec<ServerEndpoint> {
    vec![
        ServerEndpoint::new("quic", "gw.tunnox.net:443"),
        ServerEndpoint::new("tcp", "gw.tunnox.net:8000"),
        ServerEndpoint::new("websocket", "https://gw.tunnox.net/_tunnox"),
        ServerEndpoint::new("httppoll", "https://gw.tunnox.net"),
    ]
}

/// Names of every transport compiled into this binary, in the order
/// `TransportRegistry` tries them by default.
pub fn available_names() -> Vec<String> {
    let mut names = Vec::new();
    if is_available("quic") {
        names.push("quic".to_string());
    }
    names.push("tcp".to_string());
    if is_available("websocket") {
        names.push("websocket".to_string());
    }
    if is_available("httppoll") {
        names.push("httppoll".to_string());
    }
    names
}

/// Whether `protocol` has a compiled-in dialer. `tcp` is always available.
pub fn is_available(protocol: &str) -> bool {
    match protocol {
        "tcp" => true,
        #[cfg(feature = "kcp")]
        "kcp" => true,
        #[cfg(feature = "quic")]
        "quic" => true,
        #[cfg(feature = "websocket")]
        "websocket" => true,
        #[cfg(feature = "httppoll")]
        "httppoll" => true,
        _ => false,
    }
}

/// Dials `protocol` at `address` and returns a live, framed `PackageStream`.
/// Each dialer is responsible for its own connection setup; none of them
/// apply the per-attempt timeout themselves, that is the auto-connector's
/// job (or the caller's, for a single configured endpoint).
pub async fn dial(protocol: &str, address: &str) -> Result<Box<dyn PackageStream>, ClientError> {
    match protocol {
        "tcp" => tcp::dial(address).await,
        #[cfg(feature = "kcp")]
        "kcp" => kcp::dial(address).await,
        #[cfg(feature = "quic")]
        "quic" => quic::dial(address).await,
        #[cfg(feature = "websocket")]
        "websocket" => websocket::dial(address).await,
        #[cfg(feature = "httppoll")]
        "httppoll" => httppoll::dial(address).await,
        other => Err(ClientError::NotConfigured(format!(
            "transport {other:?} is not compiled into this client"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints_priority_order() {
        let endpoints = default_endpoints();
        assert_eq!(endpoints[0].protocol, "quic");
        assert_eq!(endpoints[1].protocol, "tcp");
        assert_eq!(endpoints[2].protocol, "websocket");
        assert_eq!(endpoints[3].protocol, "httppoll");
        assert_eq!(HIGH_PRIORITY_COUNT, 3);
        assert!(endpoints.len() > HIGH_PRIORITY_COUNT);
    }

    #[test]
    fn test_tcp_is_always_available() {
        assert!(is_available("tcp"));
    }

    #[test]
    fn test_unknown_protocol_is_unavailable() {
        assert!(!is_available("carrier-pigeon"));
    }
}
