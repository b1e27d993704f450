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

//! `gnoi.os.OS`: the image transfer/activate/verify state machine.
//!
//! `Install` accepts at most one transfer at a time, guarded by a process-wide
//! `tokio::sync::Mutex`. A stream that ends before `TransferEnd` leaves its
//! `NamedTempFile` to be deleted on drop, so a crashed or cancelled transfer never
//! leaves a half-written image under `image_dir`.

use std::{
    io::Write,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use futures::{Stream, StreamExt};
use log::info;
use serde_json::json;
use switchd_grpc::gnoi_os as pb;
use switchd_hostbus::HostBus;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::auth::{Authenticator, ServiceTag};

pub struct OsInstallService {
    host_bus: Arc<dyn HostBus>,
    auth: Arc<dyn Authenticator>,
    image_dir: PathBuf,
    install_lock: Arc<Mutex<()>>,
}

impl OsInstallService {
    pub fn new(host_bus: Arc<dyn HostBus>, auth: Arc<dyn Authenticator>, image_dir: PathBuf) -> Self {
        Self { host_bus, auth, image_dir, install_lock: Arc::new(Mutex::new(())) }
    }
}

/// Basic shape check for a version string used outside the `Install` staging path
/// (`Activate`), where there is no image directory to root the result in.
fn safe_version(version: &str) -> Result<(), Status> {
    if version.is_empty() {
        return Err(Status::invalid_argument("empty version string"));
    }
    Ok(())
}

/// Lexically collapses `.`/`..` components without touching the filesystem, so a
/// not-yet-existing staging path can still be checked for containment.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            },
            std::path::Component::CurDir => {},
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves the staging path for a transferred image version. Absolute paths are
/// accepted as-is; everything is then cleaned and rooted inside `image_dir` — a
/// version that cleans to somewhere outside it is rejected.
fn resolve_staging_path(image_dir: &Path, version: &str) -> Result<PathBuf, String> {
    if version.is_empty() {
        return Err("empty version string".to_string());
    }
    let candidate = if Path::new(version).is_absolute() { PathBuf::from(version) } else { image_dir.join(version) };
    let cleaned = clean_path(&candidate);
    let cleaned_root = clean_path(image_dir);
    if !cleaned.starts_with(&cleaned_root) {
        return Err(format!("version escapes image directory: {version}"));
    }
    Ok(cleaned)
}

#[tonic::async_trait]
impl pb::os_server::Os for OsInstallService {
    type InstallStream = Pin<Box<dyn Stream<Item = Result<pb::InstallResponse, Status>> + Send + 'static>>;

    async fn install(&self, request: Request<Streaming<pb::InstallRequest>>) -> Result<Response<Self::InstallStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::GnoiOs, true)?;
        let in_stream = request.into_inner();
        let host_bus = self.host_bus.clone();
        let image_dir = self.image_dir.clone();
        let lock = self.install_lock.clone();

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let guard = match lock.try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    let resp = pb::InstallResponse {
                        response: Some(pb::install_response::Response::InstallError(pb::InstallError {
                            r#type: pb::InstallErrorType::InstallInProgress as i32,
                            detail: "an Install transfer is already in progress".to_string(),
                        })),
                    };
                    let _ = tx.send(Ok(resp)).await;
                    let _ = tx.send(Err(Status::aborted("an Install transfer is already in progress"))).await;
                    return;
                },
            };
            if let Err(status) = run_install(in_stream, &host_bus, &image_dir, &tx).await {
                let _ = tx.send(Err(status)).await;
            }
            drop(guard);
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as Self::InstallStream))
    }

    async fn activate(&self, request: Request<pb::ActivateRequest>) -> Result<Response<pb::ActivateResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::GnoiOs, true)?;
        let req = request.into_inner();
        safe_version(&req.version)?;

        let response = match self.host_bus.activate_image(&req.version).await {
            Ok(_) => pb::ActivateResponse { response: Some(pb::activate_response::Response::ActivateOk(true)) },
            Err(e) if e.looks_like_non_existent() => pb::ActivateResponse {
                response: Some(pb::activate_response::Response::ActivateError(pb::ActivateError {
                    r#type: pb::ActivateErrorType::NonExistentVersion as i32,
                    detail: e.detail(),
                })),
            },
            Err(e) => pb::ActivateResponse {
                response: Some(pb::activate_response::Response::ActivateError(pb::ActivateError {
                    r#type: pb::ActivateErrorType::ActivateFailRetry as i32,
                    detail: e.detail(),
                })),
            },
        };
        Ok(Response::new(response))
    }

    async fn verify(&self, request: Request<pb::VerifyRequest>) -> Result<Response<pb::VerifyResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::GnoiOs, false)?;
        let images = self.host_bus.list_images().await.map_err(|e| Status::internal(e.detail()))?;
        let active_version = images.get("active").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let version = images.get("running").and_then(|v| v.as_str()).unwrap_or(&active_version).to_string();
        Ok(Response::new(pb::VerifyResponse { version, active_version }))
    }
}

async fn run_install(
    mut in_stream: impl Stream<Item = Result<pb::InstallRequest, Status>> + Unpin,
    host_bus: &Arc<dyn HostBus>,
    image_dir: &Path,
    tx: &mpsc::Sender<Result<pb::InstallResponse, Status>>,
) -> Result<(), Status> {
    let first = in_stream.next().await.ok_or_else(|| Status::invalid_argument("Install stream closed before any request"))??;
    let transfer = match first.request {
        Some(pb::install_request::Request::TransferRequest(t)) => t,
        _ => return Err(Status::invalid_argument("Install must start with a TransferRequest message")),
    };

    let dest = match resolve_staging_path(image_dir, &transfer.version) {
        Ok(dest) => dest,
        Err(detail) => {
            let resp = pb::InstallResponse {
                response: Some(pb::install_response::Response::InstallError(pb::InstallError {
                    r#type: pb::InstallErrorType::ParseFail as i32,
                    detail,
                })),
            };
            let _ = tx.send(Ok(resp)).await;
            return Err(Status::aborted("invalid version string"));
        },
    };

    std::fs::create_dir_all(image_dir).map_err(|e| Status::internal(e.to_string()))?;
    if dest.exists() {
        let resp = pb::InstallResponse {
            response: Some(pb::install_response::Response::InstallError(pb::InstallError {
                r#type: pb::InstallErrorType::NotSupported as i32,
                detail: format!("version {} is already present", transfer.version),
            })),
        };
        let _ = tx.send(Ok(resp)).await;
        return Err(Status::aborted("version already present"));
    }

    let mut file = NamedTempFile::new_in(image_dir).map_err(|e| Status::internal(e.to_string()))?;
    let ready = pb::InstallResponse { response: Some(pb::install_response::Response::TransferReady(pb::TransferReady {})) };
    if tx.send(Ok(ready)).await.is_err() {
        return Ok(());
    }

    let mut bytes_received: u64 = 0;
    let mut ended = false;
    while let Some(msg) = in_stream.next().await {
        let msg = msg?;
        match msg.request {
            Some(pb::install_request::Request::TransferContent(content)) => {
                file.write_all(&content.content).map_err(|e| Status::internal(e.to_string()))?;
                bytes_received += content.content.len() as u64;
                let progress = pb::InstallResponse {
                    response: Some(pb::install_response::Response::TransferProgress(pb::TransferProgress { bytes_received })),
                };
                if tx.send(Ok(progress)).await.is_err() {
                    return Ok(());
                }
            },
            Some(pb::install_request::Request::TransferEnd(_)) => {
                ended = true;
                break;
            },
            Some(pb::install_request::Request::TransferRequest(_)) => {
                return Err(Status::invalid_argument("unexpected second TransferRequest message"));
            },
            None => {},
        }
    }
    if !ended {
        info!(target: "switchd::grpc::os_install", "Install stream closed before TransferEnd, discarding staged image");
        return Err(Status::aborted("Install stream closed before TransferEnd"));
    }

    file.persist(&dest).map_err(|e| Status::internal(e.to_string()))?;

    let sync = pb::InstallResponse {
        response: Some(pb::install_response::Response::SyncProgress(pb::SyncProgress { in_sync: false, percentage_transferred: 100 })),
    };
    if tx.send(Ok(sync)).await.is_err() {
        return Ok(());
    }

    let payload = json!({"version": transfer.version, "standby_supervisor": transfer.standby_supervisor});
    host_bus.install_os(payload).await.map_err(|e| Status::internal(e.detail()))?;

    let validated = pb::InstallResponse { response: Some(pb::install_response::Response::Validated(pb::Validated { version: transfer.version })) };
    let _ = tx.send(Ok(validated)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use switchd_hostbus::BusError;

    use super::*;

    struct FakeHostBus;

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
            Ok(json!({}))
        }
        async fn activate_image(&self, version: &str) -> Result<(), BusError> {
            if version == "missing" {
                Err(BusError::Failed("requested version does not exist".to_string()))
            } else {
                Ok(())
            }
        }
        async fn list_images(&self) -> Result<serde_json::Value, BusError> {
            Ok(json!({"active": "1.0.0", "running": "1.0.0"}))
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

    #[test]
    fn safe_version_rejects_only_empty_strings() {
        assert!(safe_version("1.2.3").is_ok());
        assert!(safe_version("").is_err());
    }

    #[test]
    fn resolve_staging_path_rejects_traversal_but_accepts_absolute_paths_rooted_inside() {
        let image_dir = PathBuf::from("/var/lib/switchd/images");
        assert_eq!(resolve_staging_path(&image_dir, "1.2.3").unwrap(), image_dir.join("1.2.3"));
        assert!(resolve_staging_path(&image_dir, "").is_err());
        assert!(resolve_staging_path(&image_dir, "../etc/passwd").is_err());
        assert!(resolve_staging_path(&image_dir, "a/../../etc/passwd").is_err());

        let absolute = image_dir.join("1.2.3");
        assert_eq!(resolve_staging_path(&image_dir, absolute.to_str().unwrap()).unwrap(), absolute);
        assert!(resolve_staging_path(&image_dir, "/etc/passwd").is_err());
    }

    #[tokio::test]
    async fn install_persists_the_image_only_after_transfer_end() {
        let dir = tempfile::tempdir().unwrap();
        let host_bus: Arc<dyn HostBus> = Arc::new(FakeHostBus);
        let requests = vec![
            Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferRequest(pb::TransferRequest { version: "2.0.0".to_string(), standby_supervisor: false })) }),
            Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferContent(pb::TransferContent { content: b"image bytes".to_vec() })) }),
            Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferEnd(pb::TransferEnd {})) }),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        run_install(stream::iter(requests), &host_bus, dir.path(), &tx).await.unwrap();
        drop(tx);

        let mut saw_validated = false;
        while let Some(resp) = rx.recv().await {
            if matches!(resp.unwrap().response, Some(pb::install_response::Response::Validated(_))) {
                saw_validated = true;
            }
        }
        assert!(saw_validated);
        assert_eq!(std::fs::read(dir.path().join("2.0.0")).unwrap(), b"image bytes");
    }

    #[tokio::test]
    async fn install_stream_closed_before_transfer_end_leaves_no_image() {
        let dir = tempfile::tempdir().unwrap();
        let host_bus: Arc<dyn HostBus> = Arc::new(FakeHostBus);
        let requests = vec![
            Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferRequest(pb::TransferRequest { version: "3.0.0".to_string(), standby_supervisor: false })) }),
            Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferContent(pb::TransferContent { content: b"partial".to_vec() })) }),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        let err = run_install(stream::iter(requests), &host_bus, dir.path(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Aborted);
        drop(tx);
        while rx.recv().await.is_some() {}
        assert!(!dir.path().join("3.0.0").exists());
    }

    #[tokio::test]
    async fn empty_version_reports_parse_fail_then_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let host_bus: Arc<dyn HostBus> = Arc::new(FakeHostBus);
        let requests =
            vec![Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferRequest(pb::TransferRequest { version: String::new(), standby_supervisor: false })) })];
        let (tx, mut rx) = mpsc::channel(8);
        let err = run_install(stream::iter(requests), &host_bus, dir.path(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Aborted);
        drop(tx);
        let resp = rx.recv().await.unwrap().unwrap();
        match resp.response {
            Some(pb::install_response::Response::InstallError(e)) => assert_eq!(e.r#type, pb::InstallErrorType::ParseFail as i32),
            other => panic!("expected InstallError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn existing_staged_version_reports_not_supported_then_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join("4.0.0"), b"already here").unwrap();
        let host_bus: Arc<dyn HostBus> = Arc::new(FakeHostBus);
        let requests =
            vec![Ok(pb::InstallRequest { request: Some(pb::install_request::Request::TransferRequest(pb::TransferRequest { version: "4.0.0".to_string(), standby_supervisor: false })) })];
        let (tx, mut rx) = mpsc::channel(8);
        let err = run_install(stream::iter(requests), &host_bus, dir.path(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Aborted);
        drop(tx);
        let resp = rx.recv().await.unwrap().unwrap();
        assert!(matches!(resp.response, Some(pb::install_response::Response::InstallError(_))));
    }

    #[tokio::test]
    async fn activate_maps_non_existent_version_distinctly_from_other_failures() {
        let host_bus = FakeHostBus;
        let missing = host_bus.activate_image("missing").await.unwrap_err();
        assert!(missing.looks_like_non_existent());
        let ok = host_bus.activate_image("1.0.0").await;
        assert!(ok.is_ok());
    }
}
