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

pub mod autoconnect;
pub mod config;
pub mod dispatcher;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shared::{errors::ClientError, log};

use config::{ClientConfig, SavePolicy};
use protocol::command::CommandResponse;
use protocol::handshake::{self, ConnectionType};
use session::ControlSession;
use transport::default_endpoints;

/// Top-level handle a binary (or an embedder) holds for the lifetime of one
/// client process: the persisted configuration and the live control
/// session, wired together so reconnects and command dispatch share both.
pub struct TunnoxClient {
    pub config: Arc<ClientConfig>,
    pub session: Arc<ControlSession>,
    config_path: String,
}

impl TunnoxClient {
    /// Loads configuration from `config_path` (or the default path) and
    /// returns a client ready to `connect()`.
    pub async fn load(config_path: Option<&str>) -> Result<Self, ClientError> {
        let config = Arc::new(config::load(config_path).await?);
        Ok(TunnoxClient {
            session: Arc::new(ControlSession::new(config.clone())),
            config,
            config_path: config_path
                .unwrap_or(config::DEFAULT_CONFIG_PATH)
                .to_string(),
        })
    }

    /// Establishes the control connection: dials the configured endpoint if
    /// one is set, otherwise races the default endpoint table via the
    /// auto-connector. Persists configuration on success per the save gate.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let protocol = self.config.server_protocol();
        let address = self.config.server_address();

        let stream = if protocol.is_empty() && address.is_empty() {
            let stop = shared::system::trigger::Trigger::new();
            let attempt = autoconnect::connect(&self.config, default_endpoints(), &stop).await?;
            self.config.mark_used_auto_connection();
            attempt.stream
        } else if address.is_empty() {
            return Err(ClientError::NotConfigured(
                "server.protocol is set but server.address is empty".to_string(),
            ));
        } else {
            let mut stream = transport::dial(&protocol, &address).await?;
            let outcome = handshake::run(
                stream.as_mut(),
                &protocol,
                ConnectionType::Control,
                &self.config,
            )
            .await?;
            if let Some(connection_id) = outcome.connection_id {
                stream.set_connection_id(connection_id);
            }
            stream
        };

        self.session.adopt(stream);
        self.save_config().await;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    /// Issues a user-level command over the control stream and waits for
    /// its reply.
    pub async fn send_command(
        &self,
        command_type: &str,
        body: Value,
    ) -> Result<CommandResponse, ClientError> {
        dispatcher::send_command(
            &self.session,
            command_type,
            body,
            dispatcher::DEFAULT_COMMAND_TIMEOUT,
        )
        .await
    }

    /// Kicks off the reconnect controller; safe to call any number of times
    /// concurrently since it is internally single-flight.
    pub fn trigger_reconnect(&self) {
        let config = self.config.clone();
        let session = self.session.clone();
        tokio::spawn(async move {
            reconnect::run(config, session).await;
        });
    }

    async fn save_config(&self) {
        let policy = SavePolicy {
            allow_server_update: self.config.server_address_from_cli
                || self.config.server_protocol_from_cli,
        };
        if let Err(e) = config::save(&self.config, &self.config_path, policy).await {
            log::warn!("failed to persist client configuration: {e}");
        }
    }
}

/// Background task: watches the session for a dropped connection and hands
/// control back to the reconnect controller. Intended to be spawned once
/// per client lifetime by the binary entrypoint.
pub async fn run_reconnect_watchdog(client: Arc<TunnoxClient>, poll_interval: Duration) {
    loop {
        tokio::time::sleep(poll_interval).await;
        if !client.session.should_reconnect() {
            return;
        }
        if !client.is_connected() {
            client.trigger_reconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_with_no_file_starts_disconnected() {
        let client = TunnoxClient::load(Some("/nonexistent/tunnox-client-test.yaml"))
            .await
            .unwrap();
        assert!(!client.is_connected());
    }
}
