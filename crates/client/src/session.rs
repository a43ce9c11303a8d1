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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use shared::{errors::ClientError, log, system::trigger::Trigger};

use crate::config::ClientConfig;
use crate::protocol::command::CommandResponse;
use crate::protocol::package_stream::{PacketReader, PacketWriter, PackageStream};
use crate::protocol::{BaseType, Packet};

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// A pending command reply: the dispatcher registers one keyed by request
/// id before writing the `JsonCommand`, and the read loop fulfills it when
/// the matching `CommandResp` arrives.
pub type ReplySender = flume::Sender<CommandResponse>;

/// Holds exactly one live control stream and runs exactly one read loop and
/// one heartbeat loop for as long as that stream is live. The stream is
/// split into an independently-lockable read half and write half on adopt,
/// so a heartbeat write never contends with a read already in flight (and
/// vice versa) the way a single shared slot would.
pub struct ControlSession {
    config: Arc<ClientConfig>,

    reader: RwLock<Option<Box<dyn PacketReader>>>,
    writer: RwLock<Option<Box<dyn PacketWriter>>>,
    connected: AtomicBool,

    stop: Trigger,

    read_loop_running: AtomicBool,
    heartbeat_loop_running: AtomicBool,
    pub(crate) reconnecting: AtomicBool,
    pub(crate) config_requesting: AtomicBool,

    pub(crate) auth_failed: AtomicBool,
    pub(crate) kicked: AtomicBool,

    correlator: RwLock<std::collections::HashMap<String, ReplySender>>,
}

impl ControlSession {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        ControlSession {
            config,
            reader: RwLock::new(None),
            writer: RwLock::new(None),
            connected: AtomicBool::new(false),
            stop: Trigger::new(),
            read_loop_running: AtomicBool::new(false),
            heartbeat_loop_running: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            config_requesting: AtomicBool::new(false),
            auth_failed: AtomicBool::new(false),
            kicked: AtomicBool::new(false),
            correlator: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Installs a freshly handshaken stream as the live control connection,
    /// splitting it into a read half and write half, and spawns its read
    /// and heartbeat loops, each guarded by a compare-and-swap latch so at
    /// most one of each ever runs.
    pub fn adopt(self: &Arc<Self>, stream: Box<dyn PackageStream>) {
        let (reader, writer) = stream.split();
        *self.reader.write().unwrap() = Some(reader);
        *self.writer.write().unwrap() = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        if self
            .read_loop_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let session = self.clone();
            tokio::spawn(async move {
                session.run_read_loop().await;
                session.read_loop_running.store(false, Ordering::SeqCst);
            });
        }

        if self
            .heartbeat_loop_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let session = self.clone();
            tokio::spawn(async move {
                session.run_heartbeat_loop().await;
                session.heartbeat_loop_running.store(false, Ordering::SeqCst);
            });
        }
    }

    /// Drops the live stream without shutting the session down entirely;
    /// the reconnect controller decides whether and how to bring a new one
    /// up. Loops notice the stream is gone on their next suspension point.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let writer = self.writer.write().unwrap().take();
        let reader = self.reader.write().unwrap().take();
        if let Some(mut writer) = writer {
            let _ = writer.close().await;
        }
        drop(reader);
    }

    /// Spawns the reconnect controller if `shouldReconnect()` still holds.
    /// Called from both loops' exit paths so a dropped connection starts
    /// recovering immediately instead of waiting on the watchdog's poll.
    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.should_reconnect() {
            return;
        }
        let config = self.config.clone();
        let session = self.clone();
        tokio::spawn(async move {
            crate::reconnect::run(config, session).await;
        });
    }

    pub fn should_reconnect(&self) -> bool {
        !self.auth_failed.load(Ordering::SeqCst)
            && !self.kicked.load(Ordering::SeqCst)
            && !self.stop.is_triggered()
    }

    pub fn shut_down(&self) {
        self.stop.trigger();
    }

    /// Writes `packet` to the live stream, registering `reply` under
    /// `command_id` first so a reply that arrives before `write_packet`
    /// returns is never missed.
    pub async fn send_command(
        &self,
        command_id: String,
        packet: Packet,
        reply: ReplySender,
    ) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConfigured(
                "no live control connection".to_string(),
            ));
        }
        self.correlator.write().unwrap().insert(command_id.clone(), reply);

        // `write_packet` is async; a std `RwLock` write guard can't be held
        // across an await, so the writer is taken out, written to, and put
        // back rather than written to in place (same pattern as
        // `read_next_packet`, on the write-only lock so a command write
        // never contends with a read in flight).
        let mut taken = self.writer.write().unwrap().take();
        let result = match taken.as_mut() {
            Some(writer) => {
                let write_result = writer.write_packet(packet, true).await;
                if write_result.is_ok() {
                    writer.trigger_immediate_poll();
                }
                write_result
            }
            None => Err(ClientError::NotConfigured(
                "no live control connection".to_string(),
            )),
        };
        if let Some(writer) = taken {
            *self.writer.write().unwrap() = Some(writer);
        }

        if let Err(e) = &result {
            self.correlator.write().unwrap().remove(&command_id);
            if ClientError::message_looks_like_closed_stream(&e.to_string()) {
                self.disconnect().await;
                return Err(ClientError::ControlConnectionClosed);
            }
        }
        result
    }

    /// Removes a pending correlator entry without waiting for a reply,
    /// used by the command dispatcher when its own timeout fires first.
    pub fn cancel_reply(&self, command_id: &str) {
        self.correlator.write().unwrap().remove(command_id);
    }

    async fn run_read_loop(self: &Arc<Self>) {
        loop {
            let packet = {
                let has_stream = self.is_connected();
                if !has_stream {
                    return;
                }
                self.read_next_packet().await
            };

            match packet {
                Ok(Some(packet)) => self.dispatch_inbound(packet).await,
                Ok(None) => {
                    log::debug!("control read loop: stream closed");
                    self.disconnect().await;
                    self.schedule_reconnect();
                    return;
                }
                Err(e) => {
                    log::debug!("control read loop error: {e}");
                    self.disconnect().await;
                    self.schedule_reconnect();
                    return;
                }
            }
        }
    }

    async fn read_next_packet(&self) -> Result<Option<Packet>, ClientError> {
        // Snapshot-read: take the read half out, read one packet, put it
        // back. The write half lives behind its own lock, so a heartbeat or
        // command write never steals this slot out from under an in-flight
        // read (the session is single-reader by construction: one read
        // loop latch).
        let mut reader = match self.reader.write().unwrap().take() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        let result = reader.read_packet().await;
        match &result {
            Ok(_) => {
                *self.reader.write().unwrap() = Some(reader);
            }
            Err(ClientError::ControlConnectionClosed) => return Ok(None),
            Err(_) => {}
        }
        result.map(Some)
    }

    async fn dispatch_inbound(&self, packet: Packet) {
        match packet.base_type {
            BaseType::Heartbeat => {}
            BaseType::CommandResp => match CommandResponse::from_packet(&packet) {
                Ok(response) => {
                    let sender = self.correlator.write().unwrap().remove(&response.command_id);
                    if let Some(sender) = sender {
                        let _ = sender.send_async(response).await;
                    }
                }
                Err(e) => log::debug!("dropped malformed CommandResp: {e}"),
            },
            other => {
                log::debug!("control session: unhandled inbound packet type {other:?}");
            }
        }
    }

    async fn run_heartbeat_loop(self: &Arc<Self>) {
        let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
        loop {
            tokio::select! {
                _ = self.stop.wait_async() => return,
                _ = ticker.tick() => {
                    if !self.is_connected() {
                        return;
                    }
                    // Write-only lock: never contends with a read in
                    // flight on `self.reader`. `None` here means another
                    // task disconnected the session between the
                    // `is_connected()` check above and this `take()`; that
                    // task owns reconnect scheduling (or this is a
                    // deliberate shutdown), so just stop.
                    let mut writer = match self.writer.write().unwrap().take() {
                        Some(writer) => writer,
                        None => return,
                    };
                    let result = writer.write_packet(Packet::heartbeat(), true).await;
                    match result {
                        Ok(()) => {
                            *self.writer.write().unwrap() = Some(writer);
                        }
                        Err(e) => {
                            log::debug!("heartbeat write failed: {e}");
                            let _ = writer.close().await;
                            self.disconnect().await;
                            self.schedule_reconnect();
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session() -> ControlSession {
        ControlSession::new(Arc::new(ClientConfig::default()))
    }

    #[tokio::test]
    async fn test_new_session_is_not_connected() {
        let session = test_session();
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_should_reconnect_is_false_after_auth_failure() {
        let session = test_session();
        session.auth_failed.store(true, Ordering::SeqCst);
        assert!(!session.should_reconnect());
    }

    #[tokio::test]
    async fn test_should_reconnect_is_false_after_shutdown() {
        let session = test_session();
        session.shut_down();
        assert!(!session.should_reconnect());
    }

    #[tokio::test]
    async fn test_should_reconnect_is_true_by_default() {
        let session = test_session();
        assert!(session.should_reconnect());
    }
}
