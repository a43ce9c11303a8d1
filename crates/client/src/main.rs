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
use std::time::Duration;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::signal;

use shared::log;
use tunnox_client::TunnoxClient;

const RECONNECT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

fn parse_args() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let config_path = parse_args();
    let client = match TunnoxClient::load(config_path.as_deref()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::setup_logging("info", log::LogFormat::Text, None);
            log::error!("failed to load client configuration: {e}");
            std::process::exit(1);
        }
    };

    let log_file = if client.config.log.file.is_empty() {
        None
    } else {
        Some(client.config.log.file.as_str())
    };
    log::setup_logging(
        &client.config.log.level,
        log::LogFormat::parse(&client.config.log.format),
        log_file,
    );

    if let Err(e) = client.connect().await {
        log::error!("initial connection failed: {e}");
        std::process::exit(1);
    }
    log::info!("control connection established");

    let stop = shared::system::trigger::Trigger::new();

    {
        let stop = stop.clone();
        tokio::spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let mut terminate =
                unix_signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            #[cfg(unix)]
            tokio::select! {
                _ = ctrl_c => {
                    log::info!("received Ctrl-C, shutting down");
                }
                _ = terminate.recv() => {
                    log::info!("received SIGTERM, shutting down");
                }
            }
            #[cfg(not(unix))]
            {
                ctrl_c.await.expect("failed to listen for Ctrl-C");
                log::info!("received Ctrl-C, shutting down");
            }
            stop.trigger();
        });
    }

    {
        let client = client.clone();
        tokio::spawn(async move {
            tunnox_client::run_reconnect_watchdog(client, RECONNECT_WATCHDOG_INTERVAL).await;
        });
    }

    stop.wait_async().await;
    client.session.shut_down();
    client.disconnect().await;
}
