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

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shared::{errors::ClientError, log};
use tokio::time::timeout;

use crate::protocol::command::{CommandRequest, CommandResponse, COMMAND_TYPE_CONFIG_GET};
use crate::session::ControlSession;

/// Default round-trip timeout for a caller that does not specify its own.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const CONFIG_PULL_TIMEOUT: Duration = Duration::from_secs(30);
const CONFIG_PULL_RETRIES: u32 = 3;
const CONFIG_PULL_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Runs one command round-trip: builds a `JsonCommand` packet, registers a
/// one-shot reply channel under its request id, writes it, and waits for
/// the matching `CommandResp` (or the timeout, whichever comes first).
pub async fn send_command(
    session: &Arc<ControlSession>,
    command_type: &str,
    body: Value,
    command_timeout: Duration,
) -> Result<CommandResponse, ClientError> {
    if !session.is_connected() {
        return Err(ClientError::NotConfigured(
            "no live control connection".to_string(),
        ));
    }

    let request = CommandRequest::new(command_type, body);
    let command_id = request.command_id.clone();
    let packet = request.into_packet()?;

    let (reply_tx, reply_rx) = flume::bounded(1);
    session
        .send_command(command_id.clone(), packet, reply_tx)
        .await?;

    match timeout(command_timeout, reply_rx.recv_async()).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) => Err(ClientError::ControlConnectionClosed),
        Err(_) => {
            session.cancel_reply(&command_id);
            Err(ClientError::Network(format!(
                "command {command_type} timed out after {command_timeout:?}"
            )))
        }
    }
}

/// Post-reconnect configuration pull. Invoked only from the
/// reconnect path; the primary handshake path relies on the server pushing
/// configuration unprompted after a successful handshake.
pub async fn request_config(session: &Arc<ControlSession>) -> Result<CommandResponse, ClientError> {
    let mut last_error = None;
    for attempt in 1..=CONFIG_PULL_RETRIES {
        match send_command(
            session,
            COMMAND_TYPE_CONFIG_GET,
            Value::Null,
            CONFIG_PULL_TIMEOUT,
        )
        .await
        {
            Ok(response) => return Ok(response),
            Err(e) => {
                log::debug!("config pull attempt {attempt}/{CONFIG_PULL_RETRIES} failed: {e}");
                last_error = Some(e);
                if attempt < CONFIG_PULL_RETRIES {
                    tokio::time::sleep(CONFIG_PULL_RETRY_INTERVAL).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or(ClientError::Network(
        "config pull failed with no recorded error".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[tokio::test]
    async fn test_send_command_without_connection_fails_fast() {
        let session = Arc::new(ControlSession::new(Arc::new(ClientConfig::default())));
        let err = send_command(&session, "Ping", Value::Null, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConfigured(_)));
    }
}
