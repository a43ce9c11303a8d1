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

//! Thin wrapper around `tracing` so the rest of the crate writes
//! `log::info!(...)` the way the server side of this project does.

pub use tracing::{debug, error, info, trace, warn};

use tracing_subscriber::EnvFilter;

/// Text vs. JSON output, selected by `ClientConfig.log.format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> LogFormat {
        match s {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Installs the global `tracing` subscriber. Safe to call more than once;
/// subsequent calls are ignored (mirrors `tracing`'s own guard).
///
/// `level` is an `EnvFilter` directive (`"debug"`, `"info"`, ...); `file`,
/// when non-empty, redirects output to a daily-rolling file instead of
/// stderr.
pub fn setup_logging(level: &str, format: LogFormat, file: Option<&str>) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match (format, file) {
        (LogFormat::Json, Some(path)) => {
            let (dir, prefix) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, prefix);
            builder.json().with_writer(appender).try_init()
        }
        (LogFormat::Text, Some(path)) => {
            let (dir, prefix) = split_log_path(path);
            let appender = tracing_appender::rolling::daily(dir, prefix);
            builder.with_writer(appender).try_init()
        }
        (LogFormat::Json, None) => builder.json().try_init(),
        (LogFormat::Text, None) => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {e}");
    }
}

fn split_log_path(path: &str) -> (String, String) {
    let p = std::path::Path::new(path);
    let dir = p
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .map(|d| d.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());
    let prefix = p
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "client.log".to_string());
    (dir, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything-else"), LogFormat::Text);
    }

    #[test]
    fn test_split_log_path() {
        assert_eq!(
            split_log_path("/var/log/client/client.log"),
            ("/var/log/client".to_string(), "client.log".to_string())
        );
        assert_eq!(
            split_log_path("client.log"),
            (".".to_string(), "client.log".to_string())
        );
    }
}
