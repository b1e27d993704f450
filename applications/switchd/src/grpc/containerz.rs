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

//! `Containerz.Deploy`: streams a container image to local staging and hands it to the
//! host bus's `load_docker_image`. List/Remove/Start/Stop/Log are wire-named but
//! `Unimplemented`.

use std::{
    io::Write,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use futures::{Stream, StreamExt};
use switchd_hostbus::HostBus;
use switchd_grpc::containerz as pb;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::auth::{Authenticator, ServiceTag};

pub struct ContainerzService {
    host_bus: Arc<dyn HostBus>,
    auth: Arc<dyn Authenticator>,
    staging_dir: PathBuf,
}

impl ContainerzService {
    pub fn new(host_bus: Arc<dyn HostBus>, auth: Arc<dyn Authenticator>, staging_dir: PathBuf) -> Self {
        Self { host_bus, auth, staging_dir }
    }
}

#[tonic::async_trait]
impl pb::containerz_server::Containerz for ContainerzService {
    type DeployStream = Pin<Box<dyn Stream<Item = Result<pb::DeployResponse, Status>> + Send + 'static>>;
    type ListStream = Pin<Box<dyn Stream<Item = Result<pb::ListResponse, Status>> + Send + 'static>>;
    type LogStream = Pin<Box<dyn Stream<Item = Result<pb::LogResponse, Status>> + Send + 'static>>;

    async fn deploy(&self, request: Request<Streaming<pb::DeployRequest>>) -> Result<Response<Self::DeployStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::Containerz, true)?;
        let mut in_stream = request.into_inner();
        let host_bus = self.host_bus.clone();
        let staging_dir = self.staging_dir.clone();

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            if let Err(status) = run_deploy(&mut in_stream, &host_bus, &staging_dir, &tx).await {
                let _ = tx.send(Err(status)).await;
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as Self::DeployStream))
    }

    async fn list(&self, request: Request<pb::ListRequest>) -> Result<Response<Self::ListStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::Containerz, false)?;
        Err(Status::unimplemented("Containerz.List is not implemented"))
    }

    async fn remove(&self, request: Request<pb::RemoveRequest>) -> Result<Response<pb::RemoveResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Containerz, true)?;
        Err(Status::unimplemented("Containerz.Remove is not implemented"))
    }

    async fn start(&self, request: Request<pb::StartRequest>) -> Result<Response<pb::StartResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Containerz, true)?;
        Err(Status::unimplemented("Containerz.Start is not implemented"))
    }

    async fn stop(&self, request: Request<pb::StopRequest>) -> Result<Response<pb::StopResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Containerz, true)?;
        Err(Status::unimplemented("Containerz.Stop is not implemented"))
    }

    async fn log(&self, request: Request<pb::LogRequest>) -> Result<Response<Self::LogStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::Containerz, false)?;
        Err(Status::unimplemented("Containerz.Log is not implemented"))
    }
}

async fn run_deploy(
    in_stream: &mut (impl Stream<Item = Result<pb::DeployRequest, Status>> + Unpin),
    host_bus: &Arc<dyn HostBus>,
    staging_dir: &Path,
    tx: &mpsc::Sender<Result<pb::DeployResponse, Status>>,
) -> Result<(), Status> {
    let first = in_stream.next().await.ok_or_else(|| Status::invalid_argument("Deploy stream closed before any request"))??;
    let transfer = match first.request {
        Some(pb::deploy_request::Request::ImageTransfer(t)) => t,
        _ => return Err(Status::invalid_argument("Deploy must start with an ImageTransfer message")),
    };

    std::fs::create_dir_all(staging_dir).map_err(|e| Status::internal(e.to_string()))?;
    let mut file = NamedTempFile::new_in(staging_dir).map_err(|e| Status::internal(e.to_string()))?;
    let mut bytes_received: u64 = 0;

    while let Some(msg) = in_stream.next().await {
        let msg = msg?;
        match msg.request {
            Some(pb::deploy_request::Request::Content(content)) => {
                file.write_all(&content.image_chunk).map_err(|e| Status::internal(e.to_string()))?;
                bytes_received += content.image_chunk.len() as u64;
                let progress = pb::DeployResponse { response: Some(pb::deploy_response::Response::Progress(pb::Progress { bytes_received })) };
                if tx.send(Ok(progress)).await.is_err() {
                    return Ok(());
                }
            },
            Some(pb::deploy_request::Request::ImageTransfer(_)) => {
                return Err(Status::invalid_argument("unexpected second ImageTransfer message"));
            },
            None => {},
        }
    }

    let staged_path = file.into_temp_path().keep().map_err(|e| Status::internal(e.to_string()))?;
    host_bus.load_docker_image(&staged_path.to_string_lossy()).await.map_err(|e| Status::internal(e.to_string()))?;

    let image_id = format!("{}:{}", transfer.name, transfer.tag);
    let _ = tx.send(Ok(pb::DeployResponse { response: Some(pb::deploy_response::Response::ImageId(image_id)) })).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use switchd_hostbus::BusError;

    use super::*;

    struct RecordingHostBus {
        loaded_paths: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl HostBus for RecordingHostBus {
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
            Ok(serde_json::json!({}))
        }
        async fn factory_reset(&self, _payload: serde_json::Value) -> Result<serde_json::Value, BusError> {
            Ok(serde_json::json!({}))
        }
        async fn activate_image(&self, _version: &str) -> Result<(), BusError> {
            Ok(())
        }
        async fn list_images(&self) -> Result<serde_json::Value, BusError> {
            Ok(serde_json::json!({}))
        }
        async fn download_file(&self, _url: &str, _dest: &str) -> Result<(), BusError> {
            Ok(())
        }
        async fn load_docker_image(&self, path: &str) -> Result<(), BusError> {
            self.loaded_paths.lock().unwrap().push(path.to_string());
            Ok(())
        }
        async fn remove_file(&self, _path: &str) -> Result<(), BusError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn deploy_stages_content_then_hands_the_image_to_the_host_bus() {
        let dir = tempfile::tempdir().unwrap();
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus { loaded_paths: std::sync::Mutex::new(vec![]) });

        let requests = vec![
            Ok(pb::DeployRequest { request: Some(pb::deploy_request::Request::ImageTransfer(pb::ImageTransfer { name: "switchd-agent".to_string(), tag: "1.0".to_string() })) }),
            Ok(pb::DeployRequest { request: Some(pb::deploy_request::Request::Content(pb::Content { image_chunk: b"layer bytes".to_vec() })) }),
        ];
        let mut in_stream = stream::iter(requests);
        let (tx, mut rx) = mpsc::channel(8);
        run_deploy(&mut in_stream, &host_bus, dir.path(), &tx).await.unwrap();
        drop(tx);

        let mut saw_image_id = false;
        while let Some(resp) = rx.recv().await {
            if let Some(pb::deploy_response::Response::ImageId(id)) = resp.unwrap().response {
                assert_eq!(id, "switchd-agent:1.0");
                saw_image_id = true;
            }
        }
        assert!(saw_image_id);
    }

    #[tokio::test]
    async fn deploy_rejects_a_stream_that_does_not_start_with_image_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus { loaded_paths: std::sync::Mutex::new(vec![]) });
        let requests = vec![Ok(pb::DeployRequest { request: Some(pb::deploy_request::Request::Content(pb::Content { image_chunk: b"x".to_vec() })) })];
        let mut in_stream = stream::iter(requests);
        let (tx, _rx) = mpsc::channel(8);
        let err = run_deploy(&mut in_stream, &host_bus, dir.path(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
