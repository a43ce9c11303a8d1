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

use std::time::Duration;

use shared::{
    errors::{AggregateError, ClientError},
    log,
    system::trigger::Trigger,
};
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::protocol::handshake::{self, ConnectionType};
use crate::protocol::package_stream::PackageStream;
use crate::transport::{self, HIGH_PRIORITY_COUNT, LOW_PRIORITY_GRACE, ServerEndpoint};

const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);
const OVERALL_DEADLINE: Duration = Duration::from_secs(20);
const SEND_GUARD: Duration = Duration::from_secs(2);

/// Outcome of a winning probe: the endpoint it ran on and a live,
/// handshake-completed stream ready to be handed to the control session.
pub struct ConnectionAttempt {
    pub endpoint: ServerEndpoint,
    pub stream: Box<dyn PackageStream>,
}

struct ProbeResult {
    index: usize,
    endpoint: ServerEndpoint,
    outcome: Result<Box<dyn PackageStream>, String>,
}

/// Races every configured endpoint and returns the first one whose control
/// handshake succeeds. `stop` cancels every in-flight probe (e.g. the
/// caller shutting down); it does not depend on any single probe's outcome.
pub async fn connect(
    config: &ClientConfig,
    endpoints: Vec<ServerEndpoint>,
    stop: &Trigger,
) -> Result<ConnectionAttempt, ClientError> {
    let attempt_stop = stop.child();
    let (result_tx, result_rx) = flume::bounded::<ProbeResult>(endpoints.len().max(1));

    for (index, endpoint) in endpoints.into_iter().enumerate() {
        let tx = result_tx.clone();
        let probe_stop = attempt_stop.child();
        let protocol = endpoint.protocol.clone();
        let address = endpoint.address.clone();
        tokio::spawn(async move {
            if index >= HIGH_PRIORITY_COUNT {
                tokio::select! {
                    _ = tokio::time::sleep(LOW_PRIORITY_GRACE) => {}
                    _ = probe_stop.wait_async() => {
                        send_result(&tx, ProbeResult {
                            index,
                            endpoint: ServerEndpoint::new(protocol, address),
                            outcome: Err("cancelled during grace period".to_string()),
                        }).await;
                        return;
                    }
                }
            }

            let outcome = tokio::select! {
                _ = probe_stop.wait_async() => Err("cancelled".to_string()),
                result = timeout(PER_ATTEMPT_TIMEOUT, transport::dial(&protocol, &address)) => {
                    match result {
                        Ok(Ok(stream)) => Ok(stream),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!("dial timed out after {PER_ATTEMPT_TIMEOUT:?}")),
                    }
                }
            };

            send_result(
                &tx,
                ProbeResult {
                    index,
                    endpoint: ServerEndpoint::new(protocol, address),
                    outcome,
                },
            )
            .await;
        });
    }
    drop(result_tx);

    collect(config, result_rx, attempt_stop).await
}

async fn send_result(tx: &flume::Sender<ProbeResult>, result: ProbeResult) {
    if tx.try_send(result).is_err() {
        log::debug!("auto-connector: result channel unreceivable, probe resources dropped");
    }
}

async fn collect(
    config: &ClientConfig,
    result_rx: flume::Receiver<ProbeResult>,
    attempt_stop: Trigger,
) -> Result<ConnectionAttempt, ClientError> {
    let deadline = tokio::time::sleep(OVERALL_DEADLINE);
    tokio::pin!(deadline);

    let mut failures = Vec::new();
    let mut best_winner: Option<(usize, ServerEndpoint, Box<dyn PackageStream>)> = None;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                break;
            }
            received = result_rx.recv_async() => {
                match received {
                    Err(_) => break,
                    Ok(ProbeResult { index, endpoint, outcome }) => {
                        match outcome {
                            Err(message) => {
                                failures.push((format!("{}:{}", endpoint.protocol, endpoint.address), message));
                            }
                            Ok(mut stream) => {
                                let saved_protocol = config.server_protocol();
                                let saved_address = config.server_address();
                                config.set_server(&endpoint.protocol, &endpoint.address);
                                let handshake_result = handshake::run(
                                    stream.as_mut(),
                                    &endpoint.protocol,
                                    ConnectionType::Control,
                                    config,
                                )
                                .await;
                                config.set_server(&saved_protocol, &saved_address);

                                match handshake_result {
                                    Ok(outcome) => {
                                        if let Some(connection_id) = outcome.connection_id {
                                            stream.set_connection_id(connection_id);
                                        }
                                        attempt_stop.trigger();
                                        let replace = match &best_winner {
                                            None => true,
                                            Some((current_index, _, _)) => index < *current_index,
                                        };
                                        if replace {
                                            if let Some((_, _, mut loser)) = best_winner.take() {
                                                let _ = loser.close().await;
                                            }
                                            best_winner = Some((index, endpoint, stream));
                                        } else {
                                            let _ = stream.close().await;
                                        }
                                    }
                                    Err(e) => {
                                        failures.push((
                                            format!("{}:{}", endpoint.protocol, endpoint.address),
                                            e.to_string(),
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        if best_winner.is_some() {
            // Stragglers may still race past cancellation; a background
            // janitor closes whatever they produce within a short grace
            // window instead of delaying the winner's return.
            let janitor_rx = result_rx.clone();
            tokio::spawn(async move {
                let _ = timeout(SEND_GUARD, drain_remaining(janitor_rx)).await;
            });
            break;
        }
    }

    attempt_stop.trigger();

    match best_winner {
        Some((_, endpoint, stream)) => Ok(ConnectionAttempt { endpoint, stream }),
        None if failures.is_empty() => Err(ClientError::Network(
            "auto-connector: no endpoints configured".to_string(),
        )),
        None => Err(AggregateError::new(failures).into()),
    }
}

async fn drain_remaining(result_rx: flume::Receiver<ProbeResult>) {
    while let Ok(ProbeResult { outcome, .. }) = result_rx.recv_async().await {
        if let Ok(mut stream) = outcome {
            let _ = stream.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_with_no_endpoints_fails_fast() {
        let config = ClientConfig::default();
        let stop = Trigger::new();
        let err = connect(&config, vec![], &stop).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }

    #[tokio::test]
    async fn test_connect_aggregates_every_dial_failure() {
        let config = ClientConfig::default();
        let stop = Trigger::new();
        let endpoints = vec![
            ServerEndpoint::new("tcp", "127.0.0.1:1"),
            ServerEndpoint::new("tcp", "127.0.0.1:2"),
        ];
        let err = connect(&config, endpoints, &stop).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
