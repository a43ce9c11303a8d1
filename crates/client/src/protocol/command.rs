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

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::errors::ClientError;

use super::{BaseType, Packet};

const REQUEST_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REQUEST_ID_LENGTH: usize = 16;

/// A fresh 16-character request id, used to correlate a `JsonCommand` with
/// the `CommandResp` that eventually answers it.
pub fn new_request_id() -> String {
    let mut rng = rand::rng();
    (0..REQUEST_ID_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..REQUEST_ID_CHARS.len());
            REQUEST_ID_CHARS[idx] as char
        })
        .collect()
}

/// Payload of a `JsonCommand` packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "commandType")]
    pub command_type: String,
    #[serde(rename = "commandID")]
    pub command_id: String,
    #[serde(rename = "commandBody")]
    pub command_body: Value,
}

impl CommandRequest {
    pub fn new(command_type: impl Into<String>, command_body: Value) -> Self {
        CommandRequest {
            command_type: command_type.into(),
            command_id: new_request_id(),
            command_body,
        }
    }

    pub fn into_packet(self) -> Result<Packet, ClientError> {
        let body = serde_json::to_vec(&self)?;
        Ok(Packet::new(BaseType::JsonCommand, body))
    }
}

/// Payload of a `CommandResp` packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(rename = "commandID")]
    pub command_id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default, rename = "commandBody")]
    pub command_body: Value,
}

impl CommandResponse {
    pub fn from_packet(packet: &Packet) -> Result<Self, ClientError> {
        packet.json_payload()
    }
}

/// `ConfigGet` is the only built-in command name the reconnect path issues
/// directly; user-level commands name themselves freely.
pub const COMMAND_TYPE_CONFIG_GET: &str = "ConfigGet";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_sixteen_chars() {
        let id = new_request_id();
        assert_eq!(id.len(), REQUEST_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_request_ids_are_not_trivially_repeated() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_command_request_round_trips_through_packet() {
        let request = CommandRequest::new(COMMAND_TYPE_CONFIG_GET, Value::Null);
        let command_id = request.command_id.clone();
        let packet = request.into_packet().unwrap();
        assert!(matches!(packet.base_type, BaseType::JsonCommand));
        let decoded: CommandRequest = packet.json_payload().unwrap();
        assert_eq!(decoded.command_id, command_id);
        assert_eq!(decoded.command_type, COMMAND_TYPE_CONFIG_GET);
    }

    #[test]
    fn test_command_response_parses_from_packet() {
        let packet = Packet::new(
            BaseType::CommandResp,
            br#"{"commandID":"abc","success":true,"error":"","commandBody":{"x":1}}"#.to_vec(),
        );
        let response = CommandResponse::from_packet(&packet).unwrap();
        assert_eq!(response.command_id, "abc");
        assert!(response.success);
        assert_eq!(response.command_body["x"], 1);
    }
}
