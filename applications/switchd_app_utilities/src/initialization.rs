// Copyright 2026. The Switchd Development Community
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::path::Path;

use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("failed to read log configuration at {0}: {1}")]
    LogConfigRead(String, String),
}

/// Bootstraps logging from a log4rs YAML file, falling back to a bare stdout logger at
/// `info` level when no file is given. Mirrors `tari_app_utilities::initialization`'s
/// "best effort, never fatal to the caller" stance on log setup.
pub fn initialize_logging(log_config: Option<&Path>) -> Result<(), InitializationError> {
    match log_config {
        Some(path) => {
            log4rs::init_file(path, Default::default())
                .map_err(|e| InitializationError::LogConfigRead(path.display().to_string(), e.to_string()))?;
        },
        None => {
            let _ = env_logger_fallback();
        },
    }
    info!("switchd logging initialized");
    Ok(())
}

fn env_logger_fallback() -> Result<(), log::SetLoggerError> {
    use log4rs::{
        append::console::ConsoleAppender,
        config::{Appender, Config, Root},
    };
    let stdout = ConsoleAppender::builder().build();
    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(log::LevelFilter::Info))
        .expect("static logging config is always valid");
    log4rs::init_config(config).map(|_| ())
}
