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

//! Wires the shared server context: the DB connector, the host bus, the translation
//! bridge, and every gRPC service, before `main` ever sees them.

use std::sync::Arc;

use switchd_db::DbConnector;
use switchd_hostbus::{HostBus, StubHostBus};

use crate::{
    auth::{AllowAllAuthenticator, Authenticator},
    config::Settings,
    grpc::{
        certz::CertzService, containerz::ContainerzService, credentialz::CredentialzService, gnmi_server::GnmiService,
        os_install::OsInstallService, subscribe::{StubTranslationBackend, SubscriptionEngine, TranslationBackend},
        system::SystemService,
    },
};

/// Every gRPC service implementation switchd serves, constructed once and handed to
/// `main` for registration with `tonic::transport::Server`.
pub struct ServerContext {
    pub gnmi: GnmiService,
    pub certz: CertzService,
    pub credentialz: CredentialzService,
    pub containerz: ContainerzService,
    pub os_install: OsInstallService,
    pub system: SystemService,
}

pub fn build(settings: &Settings) -> ServerContext {
    let db = Arc::new(DbConnector::new());
    let translation: Arc<dyn TranslationBackend> = Arc::new(StubTranslationBackend);
    let host_bus: Arc<dyn HostBus> = Arc::new(StubHostBus);
    let auth: Arc<dyn Authenticator> = Arc::new(AllowAllAuthenticator);

    let engine = Arc::new(SubscriptionEngine::new(db.clone(), translation.clone(), std::time::Duration::from_millis(settings.min_sample_interval_ms)));

    ServerContext {
        gnmi: GnmiService::new(engine, auth.clone()),
        certz: CertzService::new(settings.tls_dir.clone(), settings.crl_dir.clone(), settings.certz_metadata_path.clone(), auth.clone()),
        credentialz: CredentialzService::new(
            host_bus.clone(),
            auth.clone(),
            db.clone(),
            settings.ssh_metadata_path.clone(),
            settings.console_metadata_path.clone(),
        ),
        containerz: ContainerzService::new(host_bus.clone(), auth.clone(), settings.image_dir.join("staging")),
        os_install: OsInstallService::new(host_bus.clone(), auth.clone(), settings.image_dir.clone()),
        system: SystemService::new(host_bus, auth),
    }
}
