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
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use quinn::{ClientConfig, Endpoint, RecvStream, SendStream};
use shared::errors::ClientError;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::protocol::package_stream::{Connection, FramedStream, PackageStream};

pub struct QuicConnection {
    send: SendStream,
    recv: RecvStream,
    local: SocketAddr,
    remote: SocketAddr,
}

impl AsyncRead for QuicConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for QuicConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.send).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.send).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.send).poll_shutdown(cx)
    }
}

impl Connection for QuicConnection {
    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote)
    }
}

fn client_config() -> Result<ClientConfig, ClientError> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = roots.add(cert);
    }

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
            .map_err(|e| ClientError::Network(format!("invalid quic tls config: {e}")))?,
    )))
}

/// Dials a QUIC endpoint, opens one bidirectional stream, and wraps it in
/// the generic length-prefixed framing. `address` is `host:port`; the host
/// is also used as the TLS server name.
pub async fn dial(address: &str) -> Result<Box<dyn PackageStream>, ClientError> {
    let (host, _) = address
        .rsplit_once(':')
        .ok_or_else(|| ClientError::Network(format!("invalid quic address {address}: missing port")))?;

    let remote: SocketAddr = tokio::net::lookup_host(address)
        .await
        .map_err(|e| ClientError::Network(format!("failed to resolve {address}: {e}")))?
        .next()
        .ok_or_else(|| ClientError::Network(format!("no address found for {address}")))?;

    let bind_addr: SocketAddr = if remote.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };

    let mut endpoint = Endpoint::client(bind_addr)
        .map_err(|e| ClientError::Network(format!("failed to bind quic endpoint: {e}")))?;
    endpoint.set_default_client_config(client_config()?);

    let connecting = endpoint
        .connect(remote, host)
        .map_err(|e| ClientError::Network(format!("quic connect to {address} failed: {e}")))?;

    let connection = connecting
        .await
        .map_err(|e| ClientError::Network(format!("quic handshake with {address} failed: {e}")))?;

    let local = endpoint
        .local_addr()
        .map_err(|e| ClientError::Network(format!("failed to read local quic addr: {e}")))?;

    let (send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| ClientError::Network(format!("failed to open quic stream: {e}")))?;

    Ok(Box::new(FramedStream::new(QuicConnection {
        send,
        recv,
        local,
        remote,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_rejects_address_without_port() {
        let err = dial("gw.tunnox.net").await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
