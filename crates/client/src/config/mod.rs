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

mod persist;

pub use persist::{load, save, SavePolicy};

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "./client-config.yaml";
pub const DEFAULT_LOG_FILE: &str = "./tunnox-client.log";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub protocol: String,
}

impl ServerConfig {
    pub fn is_empty(&self) -> bool {
        self.address.is_empty() && self.protocol.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: String::new(),
        }
    }
}

/// On-disk shape of `client-config.yaml`. Kept separate from `ClientConfig`
/// so credential fields can live behind a lock on the in-memory side while
/// serde only ever sees a plain, `Clone`-able snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfigFile {
    #[serde(default, rename = "clientID")]
    pub client_id: u64,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// In-memory, shareable configuration. Credentials live behind an `RwLock`
/// so the handshake engine can install them through a shared reference
/// (`&ClientConfig`, never `&mut`) while every other subsystem reads them.
pub struct ClientConfig {
    credentials: RwLock<(u64, String)>,
    pub server: RwLock<ServerConfig>,
    pub log: LogConfig,

    /// Sticky: set once if the process was started with `--server-address`
    /// or `--server-protocol` on the CLI.
    pub server_address_from_cli: bool,
    pub server_protocol_from_cli: bool,
    /// Sticky: set once auto-connection has picked a winning endpoint.
    pub used_auto_connection: std::sync::atomic::AtomicBool,
}

impl ClientConfig {
    pub fn new(file: ClientConfigFile) -> Self {
        ClientConfig {
            credentials: RwLock::new((file.client_id, file.secret_key)),
            server: RwLock::new(file.server),
            log: file.log,
            server_address_from_cli: false,
            server_protocol_from_cli: false,
            used_auto_connection: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn client_id(&self) -> u64 {
        self.credentials.read().unwrap().0
    }

    pub fn secret_key(&self) -> String {
        self.credentials.read().unwrap().1.clone()
    }

    pub fn has_credentials(&self) -> bool {
        let guard = self.credentials.read().unwrap();
        guard.0 > 0 && !guard.1.is_empty()
    }

    /// Installs credentials returned by a successful control handshake.
    /// Per the monotonicity invariant this is expected to be called at most
    /// once per client lifecycle; it always wins over whatever was there.
    pub fn install_credentials(&self, client_id: u64, secret_key: String) {
        let mut guard = self.credentials.write().unwrap();
        *guard = (client_id, secret_key);
    }

    pub fn server_protocol(&self) -> String {
        self.server.read().unwrap().protocol.clone()
    }

    pub fn server_address(&self) -> String {
        self.server.read().unwrap().address.clone()
    }

    pub fn set_server(&self, protocol: &str, address: &str) {
        let mut guard = self.server.write().unwrap();
        guard.protocol = protocol.to_string();
        guard.address = address.to_string();
    }

    pub fn mark_used_auto_connection(&self) {
        self.used_auto_connection
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn did_use_auto_connection(&self) -> bool {
        self.used_auto_connection
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn to_file(&self) -> ClientConfigFile {
        let (client_id, secret_key) = self.credentials.read().unwrap().clone();
        ClientConfigFile {
            client_id,
            secret_key,
            server: self.server.read().unwrap().clone(),
            log: self.log.clone(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::new(ClientConfigFile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_credentials_then_read_back() {
        let config = ClientConfig::default();
        assert!(!config.has_credentials());
        config.install_credentials(42, "s3cr3t".to_string());
        assert_eq!(config.client_id(), 42);
        assert_eq!(config.secret_key(), "s3cr3t");
        assert!(config.has_credentials());
    }
}
