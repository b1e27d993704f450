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

//! Telemetry-and-management agent for a network switch: gNMI/gNOI/gNSI over
//! mutual-TLS gRPC.

use std::process;

use clap::Parser;
use log::*;
use switchd::{
    builder,
    config::{Cli, Settings, SettingsError},
};
use switchd_app_utilities::initialize_logging;
use switchd_grpc::{
    containerz::containerz_server::ContainerzServer, gnmi::gnmi_server::GnmiServer, gnoi_os::os_server::OsServer,
    gnoi_system::system_server::SystemServer, gnsi_certz::certz_server::CertzServer, gnsi_credentialz::credentialz_server::CredentialzServer,
};
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

const LOG_TARGET: &str = "switchd::app";

#[tokio::main]
async fn main() {
    if let Err(err) = main_inner().await {
        eprintln!("{err}");
        error!(target: LOG_TARGET, "switchd exiting with error: {err}");
        process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("invalid listen address {0}: {1}")]
    ListenAddr(String, std::net::AddrParseError),
    #[error("failed to read TLS material under {0}: {1}")]
    TlsMaterial(String, std::io::Error),
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

async fn main_inner() -> Result<(), MainError> {
    let cli = Cli::parse();
    initialize_logging(cli.common.log_config.as_deref()).ok();

    let settings = Settings::load(&cli)?;
    info!(target: LOG_TARGET, "starting switchd, listening on {}", settings.listen);

    let addr = settings.listen.parse().map_err(|e| MainError::ListenAddr(settings.listen.clone(), e))?;
    let tls_config = load_tls_config(&settings.tls_dir).map_err(|e| MainError::TlsMaterial(settings.tls_dir.display().to_string(), e))?;

    let ctx = builder::build(&settings);

    let mut server = Server::builder();
    if let Some(tls_config) = tls_config {
        server = server.tls_config(tls_config)?;
    } else {
        warn!(target: LOG_TARGET, "no TLS material found under {}, serving plaintext gRPC", settings.tls_dir.display());
    }

    server
        .add_service(GnmiServer::new(ctx.gnmi))
        .add_service(CertzServer::new(ctx.certz))
        .add_service(CredentialzServer::new(ctx.credentialz))
        .add_service(ContainerzServer::new(ctx.containerz))
        .add_service(OsServer::new(ctx.os_install))
        .add_service(SystemServer::new(ctx.system))
        .serve(addr)
        .await?;

    Ok(())
}

/// Reads `<tls_dir>/gnxi/{active_cert,active_key,active_trust_bundle}.pem`, the profile
/// Certz bootstraps at startup. Returns `None` when no material has been provisioned yet
/// rather than failing the whole process.
fn load_tls_config(tls_dir: &std::path::Path) -> Result<Option<ServerTlsConfig>, std::io::Error> {
    let profile_dir = tls_dir.join(switchd::grpc::certz::DEFAULT_PROFILE);
    let cert_path = profile_dir.join("active_cert.pem");
    let key_path = profile_dir.join("active_key.pem");
    let ca_path = profile_dir.join("active_trust_bundle.pem");

    if !cert_path.exists() || !key_path.exists() {
        return Ok(None);
    }

    let cert = std::fs::read(&cert_path)?;
    let key = std::fs::read(&key_path)?;
    let identity = Identity::from_pem(cert, key);
    let mut tls = ServerTlsConfig::new().identity(identity);

    if ca_path.exists() {
        let ca = std::fs::read(&ca_path)?;
        tls = tls.client_ca_root(Certificate::from_pem(ca));
    }

    Ok(Some(tls))
}
