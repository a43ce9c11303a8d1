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
use std::sync::atomic::Ordering;
use std::time::Duration;

use shared::log;

use crate::autoconnect;
use crate::config::ClientConfig;
use crate::protocol::handshake::{self, ConnectionType};
use crate::session::ControlSession;
use crate::transport::default_endpoints;

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const BACKOFF_FACTOR: u32 = 2;

/// Drives the session back to a live control connection after it drops.
/// Single-flight: `reconnecting` is a CAS latch, so a second caller while
/// one reconnect is already underway is a no-op. Never runs once the
/// session has observed a sticky `authFailed`/`kicked`/shutdown condition.
pub async fn run(config: Arc<ClientConfig>, session: Arc<ControlSession>) {
    if session
        .reconnecting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let mut backoff = INITIAL_BACKOFF;
    loop {
        if !session.should_reconnect() {
            break;
        }

        match attempt_once(&config).await {
            Ok(stream) => {
                log::info!("reconnect: control connection re-established");
                session.adopt(stream);
                if config.client_id() > 0 {
                    request_mapping_config(&config, &session).await;
                }
                break;
            }
            Err(e) => {
                log::debug!("reconnect attempt failed: {e}, retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * BACKOFF_FACTOR).min(MAX_BACKOFF);
            }
        }
    }

    session.reconnecting.store(false, Ordering::SeqCst);
}

async fn attempt_once(
    config: &ClientConfig,
) -> Result<Box<dyn crate::protocol::package_stream::PackageStream>, shared::errors::ClientError>
{
    let protocol = config.server_protocol();
    let address = config.server_address();

    if protocol.is_empty() && address.is_empty() {
        let stop = shared::system::trigger::Trigger::new();
        let attempt = autoconnect::connect(config, default_endpoints(), &stop).await?;
        config.mark_used_auto_connection();
        return Ok(attempt.stream);
    }
    if address.is_empty() {
        return Err(shared::errors::ClientError::NotConfigured(
            "server.protocol is set but server.address is empty".to_string(),
        ));
    }

    let mut stream = crate::transport::dial(&protocol, &address).await?;
    let outcome =
        handshake::run(stream.as_mut(), &protocol, ConnectionType::Control, config).await?;
    if let Some(connection_id) = outcome.connection_id {
        stream.set_connection_id(connection_id);
    }
    Ok(stream)
}

/// Guarded by `configRequesting`'s CAS latch: requests the server-pushed
/// mapping configuration after a reconnect only (the primary handshake path
/// does not call this, the server pushes it unprompted there).
async fn request_mapping_config(config: &ClientConfig, session: &Arc<ControlSession>) {
    if session
        .config_requesting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let _ = config;
    let _ = crate::dispatcher::request_config(session).await;

    session.config_requesting.store(false, Ordering::SeqCst);
}
