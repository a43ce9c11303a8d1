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

use std::net::SocketAddr;

use async_trait::async_trait;
use shared::errors::ClientError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{BaseType, Packet, PacketFlags};

/// Header layout on the wire: one `packetType` byte (base type in the low
/// six bits, compression/encryption flags in the top two), followed by a
/// four-byte big-endian payload length.
const HEADER_LENGTH: usize = 1 + 4;

/// Hard ceiling on a single packet's payload, mirroring the transport's
/// underlying frame limits. Anything bigger is a protocol violation, not a
/// legitimately large command.
pub const MAX_PAYLOAD_SIZE: u32 = 1 << 20;

/// A connected transport able to move raw bytes in both directions.
/// Implemented once per transport kind (tcp, kcp, quic, websocket); the
/// HTTP long-polling transport does not implement this directly since it
/// frames over independent push/poll requests instead of one duplex byte
/// stream (see `transport::httppoll`). `'static` lets the split halves
/// below live in `Box<dyn PacketReader/Writer>` independent of this type.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    fn local_addr(&self) -> Option<SocketAddr>;
    fn remote_addr(&self) -> Option<SocketAddr>;
}

/// The read side of a split `PackageStream`. Owned exclusively by the
/// control session's read loop so it never contends with the write side
/// for the same lock.
#[async_trait]
pub trait PacketReader: Send {
    async fn read_packet(&mut self) -> Result<Packet, ClientError>;
}

/// The write side of a split `PackageStream`. Owned by whichever caller
/// currently needs to write (command dispatch, heartbeat) under its own
/// lock, independent of the read side.
#[async_trait]
pub trait PacketWriter: Send {
    async fn write_packet(&mut self, packet: Packet, flush: bool) -> Result<(), ClientError>;

    async fn close(&mut self) -> Result<(), ClientError>;

    /// Nudges a poll-based transport to fetch immediately instead of
    /// waiting out its interval. A no-op for every transport except
    /// httppoll, which overrides it.
    fn trigger_immediate_poll(&self) {}
}

/// Reads and writes whole `Packet`s off some underlying byte-oriented or
/// message-oriented transport. The handshake engine and auto-connector talk
/// to this trait rather than a concrete transport, so the same code runs
/// unmodified over tcp/kcp/quic/websocket and the httppoll specialisation.
/// Once a handshake succeeds the control session `split`s it into
/// independently-lockable read/write halves.
#[async_trait]
pub trait PackageStream: Send {
    async fn read_packet(&mut self) -> Result<Packet, ClientError>;

    /// `flush` is honored by transports that buffer writes (e.g. a
    /// `BufWriter` wrapping a `TcpStream`); message-oriented transports
    /// ignore it since every write is already a discrete frame.
    async fn write_packet(&mut self, packet: Packet, flush: bool) -> Result<(), ClientError>;

    async fn close(&mut self) -> Result<(), ClientError>;

    /// Nudges a poll-based transport to fetch immediately instead of
    /// waiting out its interval. A no-op for every transport except
    /// httppoll, which overrides it.
    fn trigger_immediate_poll(&self) {}

    /// Updates the transport's server-assigned connection id once the
    /// control handshake completes. A no-op for every transport except
    /// httppoll, which overrides it; the only generic hook the handshake
    /// engine drives this through, never a concrete downcast.
    fn set_connection_id(&self, _connection_id: String) {}

    /// Splits a handshake-completed stream into an independently-lockable
    /// read half and write half, so a reader loop and a writer loop can run
    /// concurrently without taking turns on one shared slot.
    fn split(self: Box<Self>) -> (Box<dyn PacketReader>, Box<dyn PacketWriter>);
}

/// Generic length-prefixed framing over any `Connection`. This is the
/// `PackageStream` used by every byte-stream transport (tcp, kcp, quic,
/// websocket's binary frames); httppoll frames independently and provides
/// its own `PackageStream` impl instead of wrapping this one.
pub struct FramedStream<C: Connection> {
    conn: C,
}

impl<C: Connection> FramedStream<C> {
    pub fn new(conn: C) -> Self {
        FramedStream { conn }
    }
}

#[async_trait]
impl<C: Connection> PackageStream for FramedStream<C> {
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        read_framed_packet(&mut self.conn).await
    }

    async fn write_packet(&mut self, packet: Packet, flush: bool) -> Result<(), ClientError> {
        write_framed_packet(&mut self.conn, packet, flush).await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.conn.shutdown().await?;
        Ok(())
    }

    fn split(self: Box<Self>) -> (Box<dyn PacketReader>, Box<dyn PacketWriter>) {
        let FramedStream { conn } = *self;
        let (read_half, write_half) = tokio::io::split(conn);
        (
            Box::new(FramedReadHalf { half: read_half }),
            Box::new(FramedWriteHalf { half: write_half }),
        )
    }
}

async fn read_framed_packet<R: AsyncRead + Unpin>(conn: &mut R) -> Result<Packet, ClientError> {
    let mut header = [0u8; HEADER_LENGTH];
    conn.read_exact(&mut header).await.map_err(map_read_error)?;

    let type_byte = header[0];
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if length > MAX_PAYLOAD_SIZE {
        return Err(ClientError::InvalidData(format!(
            "packet payload too large: {length} bytes"
        )));
    }

    let mut payload = vec![0u8; length as usize];
    if length > 0 {
        conn.read_exact(&mut payload).await.map_err(map_read_error)?;
    }

    Ok(Packet {
        base_type: BaseType::from(type_byte),
        flags: PacketFlags::from_byte(type_byte),
        payload,
    })
}

async fn write_framed_packet<W: AsyncWrite + Unpin>(
    conn: &mut W,
    packet: Packet,
    flush: bool,
) -> Result<(), ClientError> {
    let length = packet.payload.len() as u32;
    if length > MAX_PAYLOAD_SIZE {
        return Err(ClientError::InvalidData(format!(
            "packet payload too large: {length} bytes"
        )));
    }

    let mut header = [0u8; HEADER_LENGTH];
    header[0] = packet.packet_type_byte();
    header[1..].copy_from_slice(&length.to_be_bytes());

    conn.write_all(&header).await?;
    if !packet.payload.is_empty() {
        conn.write_all(&packet.payload).await?;
    }
    if flush {
        conn.flush().await?;
    }
    Ok(())
}

fn map_read_error(e: std::io::Error) -> ClientError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ClientError::ControlConnectionClosed
    } else {
        ClientError::from(e)
    }
}

/// Owned read half produced by [`FramedStream::split`].
struct FramedReadHalf<C: Connection> {
    half: tokio::io::ReadHalf<C>,
}

#[async_trait]
impl<C: Connection> PacketReader for FramedReadHalf<C> {
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        read_framed_packet(&mut self.half).await
    }
}

/// Owned write half produced by [`FramedStream::split`].
struct FramedWriteHalf<C: Connection> {
    half: tokio::io::WriteHalf<C>,
}

#[async_trait]
impl<C: Connection> PacketWriter for FramedWriteHalf<C> {
    async fn write_packet(&mut self, packet: Packet, flush: bool) -> Result<(), ClientError> {
        write_framed_packet(&mut self.half, packet, flush).await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.half.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A scripted `PackageStream` double: hands back a fixed sequence of
    /// packets on read, records every packet handed to it on write. Used by
    /// the handshake engine's tests so they never need a real socket.
    pub struct ScriptedStream {
        incoming: VecDeque<Packet>,
        pub written: Vec<Packet>,
        pub closed: bool,
    }

    impl ScriptedStream {
        pub fn new(incoming: Vec<Packet>) -> Self {
            ScriptedStream {
                incoming: incoming.into(),
                written: Vec::new(),
                closed: false,
            }
        }
    }

    #[async_trait]
    impl PackageStream for ScriptedStream {
        async fn read_packet(&mut self) -> Result<Packet, ClientError> {
            self.incoming
                .pop_front()
                .ok_or(ClientError::ControlConnectionClosed)
        }

        async fn write_packet(&mut self, packet: Packet, _flush: bool) -> Result<(), ClientError> {
            self.written.push(packet);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ClientError> {
            self.closed = true;
            Ok(())
        }

        fn split(self: Box<Self>) -> (Box<dyn PacketReader>, Box<dyn PacketWriter>) {
            (
                Box::new(ScriptedReadHalf {
                    incoming: self.incoming,
                }),
                Box::new(ScriptedWriteHalf),
            )
        }
    }

    struct ScriptedReadHalf {
        incoming: VecDeque<Packet>,
    }

    #[async_trait]
    impl PacketReader for ScriptedReadHalf {
        async fn read_packet(&mut self) -> Result<Packet, ClientError> {
            self.incoming
                .pop_front()
                .ok_or(ClientError::ControlConnectionClosed)
        }
    }

    struct ScriptedWriteHalf;

    #[async_trait]
    impl PacketWriter for ScriptedWriteHalf {
        async fn write_packet(&mut self, _packet: Packet, _flush: bool) -> Result<(), ClientError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scripted_stream_replays_in_order() {
        let mut stream = ScriptedStream::new(vec![Packet::heartbeat(), Packet::heartbeat()]);
        assert!(matches!(
            stream.read_packet().await.unwrap().base_type,
            BaseType::Heartbeat
        ));
        assert!(matches!(
            stream.read_packet().await.unwrap().base_type,
            BaseType::Heartbeat
        ));
        assert!(stream.read_packet().await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_stream_records_writes() {
        let mut stream = ScriptedStream::new(vec![]);
        stream
            .write_packet(Packet::new(BaseType::JsonCommand, b"hi".to_vec()), true)
            .await
            .unwrap();
        assert_eq!(stream.written.len(), 1);
        assert_eq!(stream.written[0].payload, b"hi");
    }
}
