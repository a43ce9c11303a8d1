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

use serde::{Deserialize, Serialize};
use shared::{errors::ClientError, log};

use super::{BaseType, Packet, package_stream::PackageStream};
use crate::config::ClientConfig;

pub const HANDSHAKE_VERSION: &str = "2.0";
pub const NEW_CLIENT_TOKEN: &str = "new-client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Control,
    Tunnel,
}

impl ConnectionType {
    fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Control => "control",
            ConnectionType::Tunnel => "tunnel",
        }
    }
}

#[derive(Debug, Serialize)]
struct HandshakeRequest {
    #[serde(rename = "ClientID")]
    client_id: u64,
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "Version")]
    version: &'static str,
    #[serde(rename = "Protocol")]
    protocol: String,
    #[serde(rename = "ConnectionType")]
    connection_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(rename = "Success")]
    success: bool,
    #[serde(rename = "Error", default)]
    error: String,
    #[serde(rename = "Message", default)]
    #[allow(dead_code)]
    message: String,
    #[serde(rename = "ClientID", default)]
    client_id: u64,
    #[serde(rename = "SecretKey", default)]
    secret_key: String,
    #[serde(rename = "ConnectionID", default)]
    connection_id: String,
}

/// Outcome of a successful handshake, handed back to the caller so it can
/// update a stream-specific hook (e.g. HTTP long-polling's `connectionID`)
/// without the handshake engine depending on a concrete stream type.
pub struct HandshakeOutcome {
    pub connection_id: Option<String>,
}

/// Runs one handshake round-trip over an already-connected `PackageStream`.
///
/// Sends a single `Handshake` packet built from `config`'s current
/// credentials (or an unassigned-client placeholder), then reads packets
/// until a `HandshakeResp` arrives, dropping any interleaved `Heartbeat`s.
pub async fn run(
    stream: &mut dyn PackageStream,
    protocol: &str,
    connection_type: ConnectionType,
    config: &ClientConfig,
) -> Result<HandshakeOutcome, ClientError> {
    let (client_id, token) = if config.has_credentials() {
        (config.client_id(), config.secret_key())
    } else {
        (0, NEW_CLIENT_TOKEN.to_string())
    };

    let request = HandshakeRequest {
        client_id,
        token,
        version: HANDSHAKE_VERSION,
        protocol: protocol.to_string(),
        connection_type: connection_type.as_str(),
    };

    let body = serde_json::to_vec(&request)?;
    stream
        .write_packet(Packet::new(BaseType::Handshake, body), true)
        .await?;

    let response = loop {
        let packet = stream.read_packet().await?;
        match packet.base_type {
            BaseType::Heartbeat => {
                log::debug!("handshake: ignoring interleaved heartbeat");
                continue;
            }
            BaseType::HandshakeResp => {
                let response: HandshakeResponse = packet.json_payload()?;
                break response;
            }
            other => {
                return Err(ClientError::Handshake(format!(
                    "unexpected packet during handshake: {other:?}"
                )));
            }
        }
    };

    if !response.success {
        if ClientError::message_looks_like_auth_failure(&response.error) {
            return Err(ClientError::AuthFailed(response.error));
        }
        return Err(ClientError::Handshake(response.error));
    }

    if connection_type == ConnectionType::Control
        && response.client_id > 0
        && !response.secret_key.is_empty()
    {
        config.install_credentials(response.client_id, response.secret_key.clone());
    }

    Ok(HandshakeOutcome {
        connection_id: if response.connection_id.is_empty() {
            None
        } else {
            Some(response.connection_id)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::package_stream::tests::ScriptedStream;

    fn response_packet(body: &str) -> Packet {
        Packet::new(BaseType::HandshakeResp, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_heartbeat_ignored_while_waiting_for_response() {
        let config = ClientConfig::default();
        let mut stream = ScriptedStream::new(vec![
            Packet::heartbeat(),
            Packet::heartbeat(),
            response_packet(
                r#"{"Success":true,"Error":"","Message":"ok","ClientID":42,"SecretKey":"s3cr3t","ConnectionID":""}"#,
            ),
        ]);
        let outcome = run(&mut stream, "tcp", ConnectionType::Control, &config)
            .await
            .unwrap();
        assert!(outcome.connection_id.is_none());
        assert_eq!(config.client_id(), 42);
        assert_eq!(config.secret_key(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_auth_failure_is_sticky_error_kind() {
        let config = ClientConfig::default();
        let mut stream = ScriptedStream::new(vec![response_packet(
            r#"{"Success":false,"Error":"invalid auth token","Message":"","ClientID":0,"SecretKey":"","ConnectionID":""}"#,
        )]);
        let err = run(&mut stream, "tcp", ConnectionType::Control, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn test_tunnel_handshake_does_not_update_credentials() {
        let config = ClientConfig::default();
        let mut stream = ScriptedStream::new(vec![response_packet(
            r#"{"Success":true,"Error":"","Message":"","ClientID":99,"SecretKey":"x","ConnectionID":""}"#,
        )]);
        run(&mut stream, "tcp", ConnectionType::Tunnel, &config)
            .await
            .unwrap();
        assert_eq!(config.client_id(), 0);
        assert_eq!(config.secret_key(), "");
    }

    #[tokio::test]
    async fn test_unexpected_packet_type_is_protocol_error() {
        let config = ClientConfig::default();
        let mut stream = ScriptedStream::new(vec![Packet::new(BaseType::TunnelOpen, vec![])]);
        let err = run(&mut stream, "tcp", ConnectionType::Control, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Handshake(_)));
    }
}
