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

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::errors::ClientError;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::protocol::{
    BaseType, Packet, PacketFlags,
    package_stream::{PacketReader, PacketWriter, PackageStream},
};

type WsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Each `Packet` is carried as one binary websocket message: the same
/// one-byte `packetType` plus payload used by the byte-stream transports,
/// just without the four-byte length prefix (the websocket frame already
/// delimits the message).
pub struct WebSocketPackageStream {
    socket: WsSocket,
}

#[async_trait]
impl PackageStream for WebSocketPackageStream {
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        read_ws_packet(&mut self.socket).await
    }

    async fn write_packet(&mut self, packet: Packet, flush: bool) -> Result<(), ClientError> {
        write_ws_packet(&mut self.socket, packet, flush).await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.socket
            .close(None)
            .await
            .map_err(|e| ClientError::Network(format!("websocket close error: {e}")))
    }

    fn split(self: Box<Self>) -> (Box<dyn PacketReader>, Box<dyn PacketWriter>) {
        let WebSocketPackageStream { socket } = *self;
        let (sink, stream) = socket.split();
        (
            Box::new(WebSocketReadHalf { stream }),
            Box::new(WebSocketWriteHalf { sink }),
        )
    }
}

async fn read_ws_packet<S>(stream: &mut S) -> Result<Packet, ClientError>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = stream
            .next()
            .await
            .ok_or(ClientError::ControlConnectionClosed)?
            .map_err(|e| ClientError::Network(format!("websocket read error: {e}")))?;

        match message {
            Message::Binary(bytes) => {
                if bytes.is_empty() {
                    return Err(ClientError::InvalidData(
                        "empty websocket packet frame".to_string(),
                    ));
                }
                let type_byte = bytes[0];
                return Ok(Packet {
                    base_type: BaseType::from(type_byte),
                    flags: PacketFlags::from_byte(type_byte),
                    payload: bytes[1..].to_vec(),
                });
            }
            Message::Close(_) => return Err(ClientError::ControlConnectionClosed),
            _ => continue,
        }
    }
}

async fn write_ws_packet<S>(sink: &mut S, packet: Packet, flush: bool) -> Result<(), ClientError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let mut frame = Vec::with_capacity(1 + packet.payload.len());
    frame.push(packet.packet_type_byte());
    frame.extend_from_slice(&packet.payload);

    sink.send(Message::Binary(frame.into()))
        .await
        .map_err(|e| ClientError::Network(format!("websocket write error: {e}")))?;
    if flush {
        sink.flush()
            .await
            .map_err(|e| ClientError::Network(format!("websocket flush error: {e}")))?;
    }
    Ok(())
}

/// Owned read half produced by [`WebSocketPackageStream::split`].
struct WebSocketReadHalf {
    stream: futures::stream::SplitStream<WsSocket>,
}

#[async_trait]
impl PacketReader for WebSocketReadHalf {
    async fn read_packet(&mut self) -> Result<Packet, ClientError> {
        read_ws_packet(&mut self.stream).await
    }
}

/// Owned write half produced by [`WebSocketPackageStream::split`].
struct WebSocketWriteHalf {
    sink: futures::stream::SplitSink<WsSocket, Message>,
}

#[async_trait]
impl PacketWriter for WebSocketWriteHalf {
    async fn write_packet(&mut self, packet: Packet, flush: bool) -> Result<(), ClientError> {
        write_ws_packet(&mut self.sink, packet, flush).await
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.sink
            .close()
            .await
            .map_err(|e| ClientError::Network(format!("websocket close error: {e}")))
    }
}

/// Dials a websocket endpoint. `address` carries an `https://`/`http://`
/// base URL (matching the other transports' URL-shaped addresses); it is
/// translated to `wss://`/`ws://` before handing it to the websocket client.
pub async fn dial(address: &str) -> Result<Box<dyn PackageStream>, ClientError> {
    let url = if let Some(rest) = address.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = address.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        address.to_string()
    };

    let (socket, _response) = connect_async(&url)
        .await
        .map_err(|e| ClientError::Network(format!("websocket dial to {url} failed: {e}")))?;

    Ok(Box::new(WebSocketPackageStream { socket }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_to_invalid_url_fails() {
        let err = dial("not a url").await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
