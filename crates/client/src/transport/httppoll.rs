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
use std::sync::RwLock as StdRwLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{errors::ClientError, log};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::protocol::{
    BaseType, Packet, PacketFlags,
    package_stream::{PacketReader, PacketWriter, PackageStream},
};

/// Steady-state interval between polls when nothing nudges an earlier one.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    #[serde(rename = "instanceID")]
    instance_id: &'a str,
    #[serde(rename = "connectionID")]
    connection_id: Option<&'a str>,
    packet: String,
}

#[derive(Debug, Serialize)]
struct PollRequest<'a> {
    #[serde(rename = "instanceID")]
    instance_id: &'a str,
    #[serde(rename = "connectionID")]
    connection_id: Option<&'a str>,
}

#[derive(Debug, Deserialize, Default)]
struct PollResponse {
    #[serde(default, rename = "connectionID")]
    connection_id: Option<String>,
    #[serde(default)]
    packets: Vec<String>,
}

/// HTTP long-polling specialisation of `PackageStream`. Instead of one
/// duplex byte stream it frames over independent push/poll requests: each
/// write is a push, each read is served from packets a background poll
/// loop has already fetched and buffered.
pub struct HttpPollStream {
    client: Client,
    push_url: String,
    poll_url: String,
    instance_id: String,
    connection_id: Arc<StdRwLock<Option<String>>>,
    poll_now: Arc<Notify>,
    incoming: flume::Receiver<Packet>,
}

fn connection_id_snapshot(connection_id: &StdRwLock<Option<String>>) -> Option<String> {
    connection_id.read().unwrap().clone()
}

async fn push_packet(
    client: &Client,
    push_url: &str,
    instance_id: &str,
    connection_id: &StdRwLock<Option<String>>,
    packet: Packet,
) -> Result<(), ClientError> {
    let mut frame = Vec::with_capacity(1 + packet.payload.len());
    frame.push(packet.packet_type_byte());
    frame.extend_from_slice(&packet.payload);

    let connection_id = connection_id_snapshot(connection_id);
    let request = PushRequest {
        instance_id,
        connection_id: connection_id.as_deref(),
        packet: BASE64.encode(&frame),
    };

    let response = client
        .post(push_url)
        .json(&request)
        .send()
        .await
        .map_err(|e| ClientError::Network(format!("httppoll push failed: {e}")))?;

    if !response.status().is_success() {
        return Err(ClientError::Network(format!(
            "httppoll push rejected with status {}",
            response.status()
        )));
    }
    Ok(())
}

#[async_trait]
impl PackageStream for HttpPollStream {
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        self.incoming
            .recv_async()
            .await
            .map_err(|_| ClientError::ControlConnectionClosed)
    }

    async fn write_packet(&mut self, packet: Packet, _flush: bool) -> Result<(), ClientError> {
        push_packet(
            &self.client,
            &self.push_url,
            &self.instance_id,
            &self.connection_id,
            packet,
        )
        .await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    fn trigger_immediate_poll(&self) {
        self.poll_now.notify_one();
    }

    /// Hooked by the handshake engine once the server assigns a
    /// `connectionID`, so subsequent push/poll requests carry it.
    fn set_connection_id(&self, connection_id: String) {
        *self.connection_id.write().unwrap() = Some(connection_id);
    }

    fn split(self: Box<Self>) -> (Box<dyn PacketReader>, Box<dyn PacketWriter>) {
        let HttpPollStream {
            client,
            push_url,
            poll_url: _,
            instance_id,
            connection_id,
            poll_now,
            incoming,
        } = *self;
        (
            Box::new(HttpPollReadHalf { incoming }),
            Box::new(HttpPollWriteHalf {
                client,
                push_url,
                instance_id,
                connection_id,
                poll_now,
            }),
        )
    }
}

/// Owned read half produced by [`HttpPollStream::split`].
struct HttpPollReadHalf {
    incoming: flume::Receiver<Packet>,
}

#[async_trait]
impl PacketReader for HttpPollReadHalf {
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        self.incoming
            .recv_async()
            .await
            .map_err(|_| ClientError::ControlConnectionClosed)
    }
}

/// Owned write half produced by [`HttpPollStream::split`].
struct HttpPollWriteHalf {
    client: Client,
    push_url: String,
    instance_id: String,
    connection_id: Arc<StdRwLock<Option<String>>>,
    poll_now: Arc<Notify>,
}

#[async_trait]
impl PacketWriter for HttpPollWriteHalf {
    async fn write_packet(&mut self, packet: Packet, _flush: bool) -> Result<(), ClientError> {
        push_packet(
            &self.client,
            &self.push_url,
            &self.instance_id,
            &self.connection_id,
            packet,
        )
        .await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    fn trigger_immediate_poll(&self) {
        self.poll_now.notify_one();
    }
}

async fn poll_loop(
    client: Client,
    poll_url: String,
    instance_id: String,
    connection_id: Arc<StdRwLock<Option<String>>>,
    poll_now: Arc<Notify>,
    sender: flume::Sender<Packet>,
) {
    loop {
        tokio::select! {
            _ = poll_now.notified() => {}
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let current_connection_id = connection_id.read().unwrap().clone();
        let request = PollRequest {
            instance_id: &instance_id,
            connection_id: current_connection_id.as_deref(),
        };

        let response = match client.post(&poll_url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                log::debug!("httppoll poll request failed: {e}");
                continue;
            }
        };

        let body: PollResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                log::debug!("httppoll poll response was not valid JSON: {e}");
                continue;
            }
        };

        if let Some(assigned) = body.connection_id {
            *connection_id.write().unwrap() = Some(assigned);
        }

        for encoded in body.packets {
            let bytes = match BASE64.decode(encoded.as_bytes()) {
                Ok(b) => b,
                Err(e) => {
                    log::debug!("httppoll dropped a packet with invalid base64: {e}");
                    continue;
                }
            };
            if bytes.is_empty() {
                continue;
            }
            let type_byte = bytes[0];
            let packet = Packet {
                base_type: BaseType::from(type_byte),
                flags: PacketFlags::from_byte(type_byte),
                payload: bytes[1..].to_vec(),
            };
            if sender.send_async(packet).await.is_err() {
                return;
            }
        }
    }
}

/// Builds the httppoll pseudo-connection: a client-generated `instanceID`,
/// push/poll URLs derived from `address` as the base URL, and a background
/// poll loop that feeds `read_packet()`.
pub async fn dial(address: &str) -> Result<Box<dyn PackageStream>, ClientError> {
    let client = Client::builder()
        .user_agent("tunnox-client/0.1")
        .build()
        .map_err(|e| ClientError::Network(format!("failed to build http client: {e}")))?;

    let base_url = address.trim_end_matches('/').to_string();
    let push_url = format!("{base_url}/tunnox/v1/push");
    let poll_url = format!("{base_url}/tunnox/v1/poll");
    let instance_id = Uuid::new_v4().to_string();
    let connection_id = Arc::new(StdRwLock::new(None));
    let poll_now = Arc::new(Notify::new());
    let (sender, receiver) = flume::unbounded();

    tokio::spawn(poll_loop(
        client.clone(),
        poll_url.clone(),
        instance_id.clone(),
        connection_id.clone(),
        poll_now.clone(),
        sender,
    ));

    Ok(Box::new(HttpPollStream {
        client,
        push_url,
        poll_url,
        instance_id,
        connection_id,
        poll_now,
        incoming: receiver,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_builds_push_and_poll_urls() {
        let stream = dial("https://gw.tunnox.net").await.unwrap();
        drop(stream);
    }
}
