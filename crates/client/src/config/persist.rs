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

use std::path::Path;

use shared::{errors::ClientError, log};
use tokio::fs;

use super::{ClientConfig, ClientConfigFile};

/// Governs whether `save()` is allowed to overwrite `server.address` /
/// `server.protocol` on disk. Set when the CLI explicitly supplied either
/// flag; otherwise the value already on disk wins so auto-detected or
/// previously-saved endpoints are not clobbered by an in-memory default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavePolicy {
    pub allow_server_update: bool,
}

/// Loads configuration from, in order: `cli_path` if given, else
/// [`super::DEFAULT_CONFIG_PATH`]. A missing file is not an error: it yields
/// an empty, default configuration (matching a brand-new, unconfigured
/// client). A malformed file is.
pub async fn load(cli_path: Option<&str>) -> Result<ClientConfig, ClientError> {
    let path = cli_path.unwrap_or(super::DEFAULT_CONFIG_PATH);
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let file: ClientConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ClientError::Storage(format!("invalid config at {path}: {e}")))?;
            Ok(ClientConfig::new(file))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no config file at {path}, starting with empty configuration");
            Ok(ClientConfig::default())
        }
        Err(e) => Err(ClientError::Storage(format!(
            "failed to read config at {path}: {e}"
        ))),
    }
}

/// Persists `config` to `path`, applying the save-gate and merge-with-disk
/// rules. A no-op (returns `Ok(())` without touching the file) when none of
/// the save-gate conditions hold.
pub async fn save(
    config: &ClientConfig,
    path: &str,
    policy: SavePolicy,
) -> Result<(), ClientError> {
    let used_auto = config.did_use_auto_connection();
    let cli_supplied = config.server_address_from_cli || config.server_protocol_from_cli;
    if !(cli_supplied || used_auto || config.has_credentials()) {
        log::debug!("save-gate closed: nothing worth persisting yet, skipping config write");
        return Ok(());
    }

    let mut out = config.to_file();
    normalise_log_defaults(&mut out);

    if let Some(existing) = read_existing(path).await? {
        if !policy.allow_server_update {
            out.server = existing.server;
        }
        // Credential monotonicity: a populated field on disk is never
        // clobbered by a zero/empty in-memory value.
        if existing.client_id > 0 && out.client_id == 0 {
            out.client_id = existing.client_id;
        }
        if !existing.secret_key.is_empty() && out.secret_key.is_empty() {
            out.secret_key = existing.secret_key;
        }
    }

    write_atomic(path, &out).await
}

async fn read_existing(path: &str) -> Result<Option<ClientConfigFile>, ClientError> {
    match fs::read_to_string(path).await {
        Ok(contents) => serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(|e| ClientError::Storage(format!("invalid existing config at {path}: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ClientError::Storage(format!(
            "failed to read existing config at {path}: {e}"
        ))),
    }
}

fn normalise_log_defaults(file: &mut ClientConfigFile) {
    if file.log.level.is_empty() {
        file.log.level = "info".to_string();
    }
    if file.log.format.is_empty() {
        file.log.format = "text".to_string();
    }
    if file.log.file.is_empty() {
        file.log.file = super::DEFAULT_LOG_FILE.to_string();
    }
}

async fn write_atomic(path: &str, file: &ClientConfigFile) -> Result<(), ClientError> {
    let yaml = serde_yaml::to_string(file)
        .map_err(|e| ClientError::Storage(format!("failed to serialize config: {e}")))?;

    let tmp_path = format!("{path}.tmp");
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::Storage(format!("failed to create config directory: {e}"))
            })?;
        }
    }

    if let Err(e) = fs::write(&tmp_path, yaml).await {
        return Err(ClientError::Storage(format!(
            "failed to write temp config {tmp_path}: {e}"
        )));
    }

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(ClientError::Storage(format!(
            "failed to rename temp config onto {path}: {e}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("tunnox-client-test-{name}-{}.yaml", std::process::id()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    #[serial]
    async fn test_load_missing_file_returns_default() {
        let path = temp_path("missing");
        let config = load(Some(&path)).await.unwrap();
        assert!(!config.has_credentials());
    }

    #[tokio::test]
    #[serial]
    async fn test_save_is_noop_without_gate_condition() {
        let path = temp_path("noop");
        let config = ClientConfig::default();
        save(&config, &path, SavePolicy::default()).await.unwrap();
        assert!(fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_save_then_load_round_trip_with_credentials() {
        let path = temp_path("roundtrip");
        let config = ClientConfig::default();
        config.install_credentials(7, "secret".to_string());
        save(&config, &path, SavePolicy::default()).await.unwrap();

        let reloaded = load(Some(&path)).await.unwrap();
        assert_eq!(reloaded.client_id(), 7);
        assert_eq!(reloaded.secret_key(), "secret");

        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    #[serial]
    async fn test_save_preserves_existing_server_without_update_permission() {
        let path = temp_path("preserve-server");
        let seed = ClientConfig::default();
        seed.set_server("quic", "gw.tunnox.net:443");
        save(
            &seed,
            &path,
            SavePolicy {
                allow_server_update: true,
            },
        )
        .await
        .unwrap();

        let later = ClientConfig::default();
        later.set_server("tcp", "1.2.3.4:9999");
        save(&later, &path, SavePolicy::default()).await.unwrap();

        let reloaded = load(Some(&path)).await.unwrap();
        assert_eq!(reloaded.server_protocol(), "quic");
        assert_eq!(reloaded.server_address(), "gw.tunnox.net:443");

        fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    #[serial]
    async fn test_save_never_erases_populated_credentials() {
        let path = temp_path("monotonic");
        let seed = ClientConfig::default();
        seed.install_credentials(99, "keep-me".to_string());
        save(&seed, &path, SavePolicy::default()).await.unwrap();

        let blank = ClientConfig::default();
        blank.mark_used_auto_connection();
        save(&blank, &path, SavePolicy::default()).await.unwrap();

        let reloaded = load(Some(&path)).await.unwrap();
        assert_eq!(reloaded.client_id(), 99);
        assert_eq!(reloaded.secret_key(), "keep-me");

        fs::remove_file(&path).await.ok();
    }
}
