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

//! `gnoi.system.System/FactoryReset`: the only required RPC of this service family,
//! forwarded to the host bus.

use std::sync::Arc;

use serde_json::json;
use switchd_hostbus::HostBus;
use switchd_grpc::gnoi_system as pb;
use tonic::{Request, Response, Status};

use crate::auth::{Authenticator, ServiceTag};

pub struct SystemService {
    host_bus: Arc<dyn HostBus>,
    auth: Arc<dyn Authenticator>,
}

impl SystemService {
    pub fn new(host_bus: Arc<dyn HostBus>, auth: Arc<dyn Authenticator>) -> Self {
        Self { host_bus, auth }
    }
}

#[tonic::async_trait]
impl pb::system_server::System for SystemService {
    async fn factory_reset(&self, request: Request<pb::FactoryResetRequest>) -> Result<Response<pb::FactoryResetResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::GnoiSystem, true)?;
        let req = request.into_inner();
        let payload = json!({"zero_fill": req.zero_fill, "factory_os": req.factory_os});

        let response = match self.host_bus.factory_reset(payload).await {
            Ok(_) => pb::FactoryResetResponse { response: Some(pb::factory_reset_response::Response::ResetSuccess(pb::FactoryResetSuccess { reset_time: true })) },
            Err(e) if e.is_unimplemented() => pb::FactoryResetResponse {
                response: Some(pb::factory_reset_response::Response::ResetError(pb::FactoryResetError {
                    r#type: pb::FactoryResetErrorType::Unsupported as i32,
                    detail: e.detail(),
                })),
            },
            Err(e) => pb::FactoryResetResponse {
                response: Some(pb::factory_reset_response::Response::ResetError(pb::FactoryResetError {
                    r#type: pb::FactoryResetErrorType::FactoryResetUnspecified as i32,
                    detail: e.detail(),
                })),
            },
        };
        Ok(Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use switchd_hostbus::BusError;

    use super::*;
    use crate::auth::AllowAllAuthenticator;

    struct FakeHostBus {
        reset_result: Result<(), BusError>,
    }

    #[async_trait::async_trait]
    impl HostBus for FakeHostBus {
        async fn ssh_checkpoint(&self, _op: switchd_hostbus::CheckpointOp) -> Result<(), BusError> {
            Ok(())
        }
        async fn console_checkpoint(&self, _op: switchd_hostbus::CheckpointOp) -> Result<(), BusError> {
            Ok(())
        }
        async fn glome_restore_checkpoint(&self) -> Result<(), BusError> {
            Ok(())
        }
        async fn glome_config_set(&self, _payload: serde_json::Value) -> Result<(), BusError> {
            Ok(())
        }
        async fn ssh_mgmt_set(&self, _payload: serde_json::Value) -> Result<(), BusError> {
            Ok(())
        }
        async fn console_set(&self, _payload: serde_json::Value) -> Result<(), BusError> {
            Ok(())
        }
        async fn install_os(&self, _payload: serde_json::Value) -> Result<serde_json::Value, BusError> {
            Ok(json!({}))
        }
        async fn factory_reset(&self, _payload: serde_json::Value) -> Result<serde_json::Value, BusError> {
            self.reset_result.clone()?;
            Ok(json!({}))
        }
        async fn activate_image(&self, _version: &str) -> Result<(), BusError> {
            Ok(())
        }
        async fn list_images(&self) -> Result<serde_json::Value, BusError> {
            Ok(json!({}))
        }
        async fn download_file(&self, _url: &str, _dest: &str) -> Result<(), BusError> {
            Ok(())
        }
        async fn load_docker_image(&self, _path: &str) -> Result<(), BusError> {
            Ok(())
        }
        async fn remove_file(&self, _path: &str) -> Result<(), BusError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn factory_reset_reports_unsupported_when_the_bus_does_not_implement_it() {
        let host_bus: Arc<dyn HostBus> = Arc::new(FakeHostBus { reset_result: Err(BusError::Unimplemented("no host daemon".to_string())) });
        let service = SystemService::new(host_bus, Arc::new(AllowAllAuthenticator));
        let response = service.factory_reset(Request::new(pb::FactoryResetRequest { zero_fill: false, factory_os: false })).await.unwrap().into_inner();
        match response.response {
            Some(pb::factory_reset_response::Response::ResetError(e)) => assert_eq!(e.r#type, pb::FactoryResetErrorType::Unsupported as i32),
            other => panic!("expected ResetError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn factory_reset_succeeds_when_the_bus_accepts_it() {
        let host_bus: Arc<dyn HostBus> = Arc::new(FakeHostBus { reset_result: Ok(()) });
        let service = SystemService::new(host_bus, Arc::new(AllowAllAuthenticator));
        let response = service.factory_reset(Request::new(pb::FactoryResetRequest { zero_fill: true, factory_os: false })).await.unwrap().into_inner();
        assert!(matches!(response.response, Some(pb::factory_reset_response::Response::ResetSuccess(_))));
    }
}
