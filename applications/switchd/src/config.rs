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

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use switchd_app_utilities::CommonCliArgs;
use thiserror::Error;

#[derive(Clone, Debug, Parser)]
#[clap(name = "switchd", about = "Telemetry-and-management agent for a network switch")]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonCliArgs,

    /// Listen address for the mutually-authenticated TLS gRPC endpoint.
    #[clap(long, env = "SWITCHD_LISTEN", default_value = "0.0.0.0:50052")]
    pub listen: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
    #[serde(default = "default_crl_dir")]
    pub crl_dir: PathBuf,
    #[serde(default = "default_tls_dir")]
    pub tls_dir: PathBuf,
    #[serde(default = "default_certz_metadata")]
    pub certz_metadata_path: PathBuf,
    #[serde(default = "default_ssh_metadata")]
    pub ssh_metadata_path: PathBuf,
    #[serde(default = "default_console_metadata")]
    pub console_metadata_path: PathBuf,
    /// Floor for `SampleInterval`, in milliseconds.
    #[serde(default = "default_min_sample_interval_ms")]
    pub min_sample_interval_ms: u64,
    #[serde(default)]
    pub report_grpc_error: bool,
}

fn default_listen() -> String {
    "0.0.0.0:50052".to_string()
}
fn default_image_dir() -> PathBuf {
    PathBuf::from("/host/images")
}
fn default_crl_dir() -> PathBuf {
    PathBuf::from("/etc/sonic/crl")
}
fn default_tls_dir() -> PathBuf {
    PathBuf::from("/etc/sonic/credentials")
}
fn default_certz_metadata() -> PathBuf {
    PathBuf::from("/etc/sonic/credentials/certz_meta.json")
}
fn default_ssh_metadata() -> PathBuf {
    PathBuf::from("/etc/sonic/credentials/ssh_meta.json")
}
fn default_console_metadata() -> PathBuf {
    PathBuf::from("/etc/sonic/credentials/console_meta.json")
}
fn default_min_sample_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl Settings {
    /// Layers defaults -> optional TOML file -> `SWITCHD_`-prefixed env overrides.
    pub fn load(cli: &Cli) -> Result<Settings, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = &cli.common.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix("SWITCHD").separator("__"));
        let built = builder.build()?;
        let mut settings: Settings = built.try_deserialize()?;
        settings.listen = cli.listen.clone();
        Ok(settings)
    }
}
