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

//! `gnsi.credentialz.Credentialz`: SSH/console/GLOME credential rotation.
//!
//! Both `Rotate*` RPCs write through to the host bus request by request rather than
//! staging a single aggregate payload: `Password` goes to `ConsoleSet`, `Credential`
//! and `User` go to `SshMgmtSet`, each immediately followed by a freshness row in
//! `STATE_DB/CREDENTIALS`. A checkpoint is taken on the host bus the first time a
//! session touches a given surface (console or SSH) so that a stream which ends before
//! `FinalizeRequest` can be rolled back in full, including the DB rows it wrote.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

use futures::{Stream, StreamExt};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use switchd_db::{value::Fields, Database, DbConnector};
use switchd_grpc::gnsi_credentialz as pb;
use switchd_hostbus::{CheckpointOp, HostBus};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::{
    auth::{Authenticator, ServiceTag},
    grpc::to_nanos,
};

const LOG_TARGET: &str = "switchd::grpc::credentialz";
const CREDENTIALS_TABLE: &str = "CREDENTIALS";
const STATE_DB: &str = "STATE_DB";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoredKey {
    keytype: String,
    key: String,
    description: String,
    options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AccountSshMeta {
    #[serde(default)]
    keys: Vec<StoredKey>,
    #[serde(default)]
    keys_version: String,
    #[serde(default)]
    keys_created_on: i64,
    #[serde(default)]
    principals: Vec<String>,
    #[serde(default)]
    principals_version: String,
    #[serde(default)]
    principals_created_on: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SshMetadata {
    #[serde(default)]
    accounts: HashMap<String, AccountSshMeta>,
    #[serde(default)]
    ca_keys_version: String,
    #[serde(default)]
    ca_keys_created_on: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AccountConsoleMeta {
    #[serde(default)]
    password_version: String,
    #[serde(default)]
    password_created_on: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConsoleMetadata {
    #[serde(default)]
    accounts: HashMap<String, AccountConsoleMeta>,
}

pub struct CredentialzService {
    host_bus: Arc<dyn HostBus>,
    auth: Arc<dyn Authenticator>,
    db: Arc<DbConnector>,
    ssh_metadata_path: PathBuf,
    console_metadata_path: PathBuf,
    /// Single process-wide writer lock shared by both `Rotate*` RPCs: only one
    /// credential rotation of either kind may be in flight at a time.
    credz_lock: Arc<Mutex<()>>,
}

impl CredentialzService {
    pub fn new(
        host_bus: Arc<dyn HostBus>,
        auth: Arc<dyn Authenticator>,
        db: Arc<DbConnector>,
        ssh_metadata_path: PathBuf,
        console_metadata_path: PathBuf,
    ) -> Self {
        Self { host_bus, auth, db, ssh_metadata_path, console_metadata_path, credz_lock: Arc::new(Mutex::new(())) }
    }

    fn load_ssh_metadata(&self) -> SshMetadata {
        std::fs::read(&self.ssh_metadata_path).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok()).unwrap_or_default()
    }

    fn load_console_metadata(&self) -> ConsoleMetadata {
        std::fs::read(&self.console_metadata_path).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok()).unwrap_or_default()
    }
}

#[tonic::async_trait]
impl pb::credentialz_server::Credentialz for CredentialzService {
    type RotateAccountCredentialsStream = Pin<Box<dyn Stream<Item = Result<pb::RotateAccountCredentialsResponse, Status>> + Send + 'static>>;
    type RotateHostParametersStream = Pin<Box<dyn Stream<Item = Result<pb::RotateHostParametersResponse, Status>> + Send + 'static>>;

    async fn rotate_account_credentials(
        &self,
        request: Request<Streaming<pb::RotateAccountCredentialsRequest>>,
    ) -> Result<Response<Self::RotateAccountCredentialsStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::Credentialz, true)?;
        let in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(8);

        let lock = self.credz_lock.clone();
        let host_bus = self.host_bus.clone();
        let state_db = self.db.get(STATE_DB).map_err(|e| Status::internal(e.to_string()))?;
        let ssh_metadata_path = self.ssh_metadata_path.clone();
        let console_metadata_path = self.console_metadata_path.clone();
        let ssh_metadata = self.load_ssh_metadata();
        let console_metadata = self.load_console_metadata();

        tokio::spawn(async move {
            let _guard = match lock.try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    let _ = tx.send(Err(Status::aborted("a Credentialz rotation is already in progress"))).await;
                    return;
                },
            };
            if let Err(status) =
                run_rotate_account_credentials(in_stream, &host_bus, &state_db, &ssh_metadata_path, &console_metadata_path, ssh_metadata, console_metadata, &tx)
                    .await
            {
                let _ = tx.send(Err(status)).await;
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as Self::RotateAccountCredentialsStream))
    }

    async fn rotate_host_parameters(
        &self,
        request: Request<Streaming<pb::RotateHostParametersRequest>>,
    ) -> Result<Response<Self::RotateHostParametersStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::Credentialz, true)?;
        let in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(8);

        let lock = self.credz_lock.clone();
        let host_bus = self.host_bus.clone();
        let state_db = self.db.get(STATE_DB).map_err(|e| Status::internal(e.to_string()))?;
        let ssh_metadata_path = self.ssh_metadata_path.clone();
        let ssh_metadata = self.load_ssh_metadata();

        tokio::spawn(async move {
            let _guard = match lock.try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => {
                    let _ = tx.send(Err(Status::aborted("a Credentialz rotation is already in progress"))).await;
                    return;
                },
            };
            if let Err(status) = run_rotate_host_parameters(in_stream, &host_bus, &state_db, &ssh_metadata_path, ssh_metadata, &tx).await {
                let _ = tx.send(Err(status)).await;
            }
        });
        Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as Self::RotateHostParametersStream))
    }

    async fn can_generate_key(&self, request: Request<pb::CanGenerateKeyRequest>) -> Result<Response<pb::CanGenerateKeyResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Credentialz, false)?;
        let keytype = request.into_inner().keytype;
        let can_generate = matches!(keytype.as_str(), "ssh-ed25519" | "ssh-rsa" | "ecdsa-sha2-nistp256" | "ecdsa-sha2-nistp384");
        Ok(Response::new(pb::CanGenerateKeyResponse { can_generate }))
    }

    async fn get_public_keys(&self, request: Request<pb::GetPublicKeysRequest>) -> Result<Response<pb::GetPublicKeysResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Credentialz, false)?;
        let account = request.into_inner().account;
        let metadata = self.load_ssh_metadata();
        let keys = metadata
            .accounts
            .get(&account)
            .map(|a| a.keys.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|k| {
                let key = base64::decode(&k.key).unwrap_or_default();
                pb::AuthorizedKey { keytype: k.keytype, key, description: k.description, options: k.options }
            })
            .collect();
        Ok(Response::new(pb::GetPublicKeysResponse { authorized_keys: keys }))
    }
}

fn row_snapshot(db: &Arc<dyn Database>, table: &str, key: &str) -> Option<Fields> {
    match db.get(table, Some(key)) {
        Ok(switchd_db::DbValue::Row(fields)) => Some(fields),
        _ => None,
    }
}

fn restore_row(db: &Arc<dyn Database>, table: &str, key: &str, snapshot: Option<Fields>) {
    match snapshot {
        Some(fields) => {
            for (field, value) in fields.iter() {
                let _ = db.set_field(table, Some(key), field, value);
            }
        },
        None => {
            let _ = db.del_key(table, Some(key));
        },
    }
}

fn format_authorized_key(k: &pb::AuthorizedKey) -> String {
    let mut parts = vec![k.keytype.clone(), base64::encode(&k.key), k.description.clone()];
    parts.extend(k.options.iter().cloned());
    parts.join(" ")
}

async fn run_rotate_account_credentials(
    mut in_stream: impl Stream<Item = Result<pb::RotateAccountCredentialsRequest, Status>> + Unpin,
    host_bus: &Arc<dyn HostBus>,
    state_db: &Arc<dyn Database>,
    ssh_metadata_path: &Path,
    console_metadata_path: &Path,
    mut ssh_metadata: SshMetadata,
    mut console_metadata: ConsoleMetadata,
    tx: &mpsc::Sender<Result<pb::RotateAccountCredentialsResponse, Status>>,
) -> Result<(), Status> {
    let mut ssh_checkpointed = false;
    let mut console_checkpointed = false;
    let mut ssh_undo: HashMap<String, Option<Fields>> = HashMap::new();
    let mut console_undo: HashMap<String, Option<Fields>> = HashMap::new();
    let mut finalized = false;

    let outcome: Result<(), Status> = async {
        while let Some(msg) = in_stream.next().await {
            let msg = msg?;
            match msg.request {
                Some(pb::rotate_account_credentials_request::Request::Password(p)) => {
                    for acct in &p.accounts {
                        if acct.account.is_empty() || acct.version.is_empty() || acct.created_on == 0 {
                            return Err(Status::invalid_argument("password request requires account, version, and created_on"));
                        }
                        match &acct.password {
                            Some(pb::PasswordValue { value: Some(pb::password_value::Value::Plaintext(_)) }) => {},
                            Some(pb::PasswordValue { value: Some(pb::password_value::Value::Hashed(_)) }) => {
                                return Err(Status::unimplemented("hashed password rotation is not implemented"));
                            },
                            _ => return Err(Status::invalid_argument("password request missing a password value")),
                        }
                    }
                    if !console_checkpointed {
                        host_bus.console_checkpoint(CheckpointOp::Create).await.map_err(|e| Status::internal(e.detail()))?;
                        console_checkpointed = true;
                    }

                    let passwords: Vec<_> = p
                        .accounts
                        .iter()
                        .filter_map(|a| match &a.password {
                            Some(pb::PasswordValue { value: Some(pb::password_value::Value::Plaintext(pw)) }) => {
                                Some(json!({"name": a.account, "password": pw}))
                            },
                            _ => None,
                        })
                        .collect();
                    host_bus.console_set(json!({"ConsolePasswords": passwords})).await.map_err(|e| Status::internal(e.detail()))?;

                    for acct in &p.accounts {
                        let key = format!("CONSOLE_ACCOUNT|{}", acct.account);
                        console_undo.entry(key.clone()).or_insert_with(|| row_snapshot(state_db, CREDENTIALS_TABLE, &key));
                        let created_on = to_nanos(acct.created_on);
                        let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "password_version", &acct.version);
                        let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "password_created_on", &created_on.to_string());
                        let entry = console_metadata.accounts.entry(acct.account.clone()).or_default();
                        entry.password_version = acct.version.clone();
                        entry.password_created_on = created_on;
                    }

                    let echo = pb::RotateAccountCredentialsResponse { response: Some(pb::rotate_account_credentials_response::Response::Password(p)) };
                    if tx.send(Ok(echo)).await.is_err() {
                        return Ok(());
                    }
                },
                Some(pb::rotate_account_credentials_request::Request::Credential(c)) => {
                    for acct in &c.accounts {
                        if acct.account.is_empty() || acct.version.is_empty() || acct.created_on == 0 || acct.authorized_keys.is_empty() {
                            return Err(Status::invalid_argument("credential request requires account, version, created_on, and at least one key"));
                        }
                    }
                    if !ssh_checkpointed {
                        host_bus.ssh_checkpoint(CheckpointOp::Create).await.map_err(|e| Status::internal(e.detail()))?;
                        ssh_checkpointed = true;
                    }

                    let accounts_payload: Vec<_> = c
                        .accounts
                        .iter()
                        .map(|a| json!({"account": a.account, "version": a.version, "created_on": a.created_on, "keys": a.authorized_keys.iter().map(format_authorized_key).collect::<Vec<_>>()}))
                        .collect();
                    host_bus.ssh_mgmt_set(json!({"SshAccountKeys": accounts_payload})).await.map_err(|e| Status::internal(e.detail()))?;

                    for acct in &c.accounts {
                        let key = format!("SSH_ACCOUNT|{}", acct.account);
                        ssh_undo.entry(key.clone()).or_insert_with(|| row_snapshot(state_db, CREDENTIALS_TABLE, &key));
                        let created_on = to_nanos(acct.created_on);
                        let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "keys_version", &acct.version);
                        let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "keys_created_on", &created_on.to_string());
                        let stored_keys = acct
                            .authorized_keys
                            .iter()
                            .map(|k| StoredKey { keytype: k.keytype.clone(), key: base64::encode(&k.key), description: k.description.clone(), options: k.options.clone() })
                            .collect();
                        let entry = ssh_metadata.accounts.entry(acct.account.clone()).or_default();
                        entry.keys = stored_keys;
                        entry.keys_version = acct.version.clone();
                        entry.keys_created_on = created_on;
                    }

                    let echo = pb::RotateAccountCredentialsResponse { response: Some(pb::rotate_account_credentials_response::Response::Credential(c)) };
                    if tx.send(Ok(echo)).await.is_err() {
                        return Ok(());
                    }
                },
                Some(pb::rotate_account_credentials_request::Request::User(u)) => {
                    for acct in &u.accounts {
                        if acct.account.is_empty() || acct.version.is_empty() || acct.created_on == 0 || acct.authorized_principals.is_empty() {
                            return Err(Status::invalid_argument("user request requires account, version, created_on, and at least one principal"));
                        }
                    }
                    if !ssh_checkpointed {
                        host_bus.ssh_checkpoint(CheckpointOp::Create).await.map_err(|e| Status::internal(e.detail()))?;
                        ssh_checkpointed = true;
                    }

                    let accounts_payload: Vec<_> =
                        u.accounts.iter().map(|a| json!({"account": a.account, "version": a.version, "created_on": a.created_on, "principals": a.authorized_principals})).collect();
                    host_bus.ssh_mgmt_set(json!({"SshAccountUsers": accounts_payload})).await.map_err(|e| Status::internal(e.detail()))?;

                    for acct in &u.accounts {
                        let key = format!("SSH_ACCOUNT|{}", acct.account);
                        ssh_undo.entry(key.clone()).or_insert_with(|| row_snapshot(state_db, CREDENTIALS_TABLE, &key));
                        let created_on = to_nanos(acct.created_on);
                        let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "principals_version", &acct.version);
                        let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "principals_created_on", &created_on.to_string());
                        let entry = ssh_metadata.accounts.entry(acct.account.clone()).or_default();
                        entry.principals = acct.authorized_principals.clone();
                        entry.principals_version = acct.version.clone();
                        entry.principals_created_on = created_on;
                    }

                    let echo = pb::RotateAccountCredentialsResponse { response: Some(pb::rotate_account_credentials_response::Response::User(u)) };
                    if tx.send(Ok(echo)).await.is_err() {
                        return Ok(());
                    }
                },
                Some(pb::rotate_account_credentials_request::Request::Finalize(_)) => {
                    finalized = true;
                    break;
                },
                None => {},
            }
        }
        Ok(())
    }
    .await;

    if let Err(status) = outcome {
        restore_account_session(host_bus, state_db, ssh_checkpointed, console_checkpointed, ssh_undo, console_undo).await;
        return Err(status);
    }

    if !finalized {
        restore_account_session(host_bus, state_db, ssh_checkpointed, console_checkpointed, ssh_undo, console_undo).await;
        info!(target: LOG_TARGET, "RotateAccountCredentials stream closed without finalize, restored checkpoint(s)");
        return Err(Status::aborted("RotateAccountCredentials stream closed before FinalizeRequest"));
    }

    if ssh_checkpointed {
        let bytes = serde_json::to_vec_pretty(&ssh_metadata).map_err(|e| Status::internal(e.to_string()))?;
        std::fs::write(ssh_metadata_path, bytes).map_err(|e| Status::internal(e.to_string()))?;
        host_bus.ssh_checkpoint(CheckpointOp::Delete).await.map_err(|e| Status::internal(e.detail()))?;
    }
    if console_checkpointed {
        let bytes = serde_json::to_vec_pretty(&console_metadata).map_err(|e| Status::internal(e.to_string()))?;
        std::fs::write(console_metadata_path, bytes).map_err(|e| Status::internal(e.to_string()))?;
        host_bus.console_checkpoint(CheckpointOp::Delete).await.map_err(|e| Status::internal(e.detail()))?;
    }

    let finalize_echo =
        pb::RotateAccountCredentialsResponse { response: Some(pb::rotate_account_credentials_response::Response::Finalize(pb::FinalizeRequest {})) };
    let _ = tx.send(Ok(finalize_echo)).await;
    Ok(())
}

async fn restore_account_session(
    host_bus: &Arc<dyn HostBus>,
    state_db: &Arc<dyn Database>,
    ssh_checkpointed: bool,
    console_checkpointed: bool,
    ssh_undo: HashMap<String, Option<Fields>>,
    console_undo: HashMap<String, Option<Fields>>,
) {
    if ssh_checkpointed {
        let _ = host_bus.ssh_checkpoint(CheckpointOp::Restore).await;
    }
    if console_checkpointed {
        let _ = host_bus.console_checkpoint(CheckpointOp::Restore).await;
    }
    for (key, snapshot) in ssh_undo {
        restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
    }
    for (key, snapshot) in console_undo {
        restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
    }
}

async fn run_rotate_host_parameters(
    mut in_stream: impl Stream<Item = Result<pb::RotateHostParametersRequest, Status>> + Unpin,
    host_bus: &Arc<dyn HostBus>,
    state_db: &Arc<dyn Database>,
    ssh_metadata_path: &Path,
    mut ssh_metadata: SshMetadata,
    tx: &mpsc::Sender<Result<pb::RotateHostParametersResponse, Status>>,
) -> Result<(), Status> {
    let first = match in_stream.next().await {
        Some(msg) => msg?,
        None => return Ok(()),
    };

    match first.request {
        Some(pb::rotate_host_parameters_request::Request::Finalize(_)) => {
            Err(Status::aborted("RotateHostParameters cannot start with FinalizeRequest"))
        },
        Some(pb::rotate_host_parameters_request::Request::SshCaPublicKey(r)) => {
            run_ssh_ca_public_key(r, host_bus, state_db, ssh_metadata_path, &mut ssh_metadata, &mut in_stream, tx).await
        },
        Some(pb::rotate_host_parameters_request::Request::Glome(g)) => run_glome(g, host_bus, state_db, &mut in_stream, tx).await,
        Some(pb::rotate_host_parameters_request::Request::ServerKeys(_))
        | Some(pb::rotate_host_parameters_request::Request::GenerateKeys(_))
        | Some(pb::rotate_host_parameters_request::Request::AuthenticationAllowed(_))
        | Some(pb::rotate_host_parameters_request::Request::AuthorizedPrincipalCheck(_)) => {
            Err(Status::unimplemented("this RotateHostParameters request variant is not implemented"))
        },
        None => Ok(()),
    }
}

async fn await_finalize(in_stream: &mut (impl Stream<Item = Result<pb::RotateHostParametersRequest, Status>> + Unpin)) -> Result<(), Status> {
    match in_stream.next().await {
        Some(Ok(pb::RotateHostParametersRequest { request: Some(pb::rotate_host_parameters_request::Request::Finalize(_)) })) => Ok(()),
        Some(Ok(_)) => Err(Status::invalid_argument("RotateHostParameters expects only a FinalizeRequest after the first message")),
        Some(Err(status)) => Err(status),
        None => Err(Status::aborted("RotateHostParameters stream closed before FinalizeRequest")),
    }
}

async fn run_ssh_ca_public_key(
    req: pb::SshCaPublicKeyRequest,
    host_bus: &Arc<dyn HostBus>,
    state_db: &Arc<dyn Database>,
    ssh_metadata_path: &Path,
    ssh_metadata: &mut SshMetadata,
    in_stream: &mut (impl Stream<Item = Result<pb::RotateHostParametersRequest, Status>> + Unpin),
    tx: &mpsc::Sender<Result<pb::RotateHostParametersResponse, Status>>,
) -> Result<(), Status> {
    if req.ssh_ca_public_keys.is_empty() || req.version.is_empty() || req.created_on == 0 {
        return Err(Status::invalid_argument("SshCaPublicKey request requires non-empty keys, version, and created_on"));
    }

    host_bus.ssh_checkpoint(CheckpointOp::Create).await.map_err(|e| Status::internal(e.detail()))?;
    let key = "SSH_HOST".to_string();
    let snapshot = row_snapshot(state_db, CREDENTIALS_TABLE, &key);

    let payload = json!({"SshCaPublicKey": req.ssh_ca_public_keys.iter().map(base64::encode).collect::<Vec<_>>()});
    if let Err(e) = host_bus.ssh_mgmt_set(payload).await {
        let _ = host_bus.ssh_checkpoint(CheckpointOp::Restore).await;
        return Err(Status::internal(e.detail()));
    }

    let created_on = to_nanos(req.created_on);
    let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "ca_keys_version", &req.version);
    let _ = state_db.set_field(CREDENTIALS_TABLE, Some(&key), "ca_keys_created_on", &created_on.to_string());
    ssh_metadata.ca_keys_version = req.version.clone();
    ssh_metadata.ca_keys_created_on = created_on;

    let echo = pb::RotateHostParametersResponse { response: Some(pb::rotate_host_parameters_response::Response::SshCaPublicKey(req)) };
    if tx.send(Ok(echo)).await.is_err() {
        let _ = host_bus.ssh_checkpoint(CheckpointOp::Restore).await;
        restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
        return Ok(());
    }

    match await_finalize(in_stream).await {
        Ok(()) => {
            let bytes = serde_json::to_vec_pretty(ssh_metadata).map_err(|e| Status::internal(e.to_string()))?;
            std::fs::write(ssh_metadata_path, bytes).map_err(|e| Status::internal(e.to_string()))?;
            host_bus.ssh_checkpoint(CheckpointOp::Delete).await.map_err(|e| Status::internal(e.detail()))?;
            let finalize_echo = pb::RotateHostParametersResponse { response: Some(pb::rotate_host_parameters_response::Response::Finalize(pb::FinalizeRequest {})) };
            let _ = tx.send(Ok(finalize_echo)).await;
            Ok(())
        },
        Err(status) => {
            let _ = host_bus.ssh_checkpoint(CheckpointOp::Restore).await;
            restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
            Err(status)
        },
    }
}

/// `enabled=false` must not carry a key, key_version, or url_prefix; `enabled=true`
/// requires all three to be present and the url_prefix to look like a URL.
fn validate_glome(req: &pb::GlomeRequest) -> Result<(), Status> {
    if req.enabled {
        if req.key.is_empty() {
            return Err(Status::aborted("GLOME rotation requires a non-empty key when enabled"));
        }
        if req.key_version == 0 {
            return Err(Status::aborted("GLOME rotation requires key_version > 0 when enabled"));
        }
        if !looks_like_url(&req.url_prefix) {
            return Err(Status::aborted(format!("GLOME rotation requires a parseable url_prefix, got {:?}", req.url_prefix)));
        }
    } else if !req.key.is_empty() || req.key_version != 0 || !req.url_prefix.is_empty() {
        return Err(Status::aborted("GLOME rotation with enabled=false must not carry a key, key_version, or url_prefix"));
    }
    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")) else {
        return false;
    };
    !rest.is_empty() && !rest.chars().any(char::is_whitespace)
}

async fn run_glome(
    req: pb::GlomeRequest,
    host_bus: &Arc<dyn HostBus>,
    state_db: &Arc<dyn Database>,
    in_stream: &mut (impl Stream<Item = Result<pb::RotateHostParametersRequest, Status>> + Unpin),
    tx: &mpsc::Sender<Result<pb::RotateHostParametersResponse, Status>>,
) -> Result<(), Status> {
    validate_glome(&req)?;

    let key = "GLOME_CONFIG".to_string();
    let snapshot = row_snapshot(state_db, CREDENTIALS_TABLE, &key);

    let payload = json!({"enabled": req.enabled, "key": base64::encode(&req.key), "key_version": req.key_version, "url_prefix": req.url_prefix});
    if let Err(e) = host_bus.glome_config_set(payload).await {
        let _ = host_bus.glome_restore_checkpoint().await;
        return Err(Status::internal(e.detail()));
    }

    let now_ns = now_nanos();
    let write_result = (|| -> Result<(), Status> {
        state_db.set_field(CREDENTIALS_TABLE, Some(&key), "enabled", if req.enabled { "true" } else { "false" }).map_err(|e| Status::internal(e.to_string()))?;
        state_db.set_field(CREDENTIALS_TABLE, Some(&key), "key_version", &req.key_version.to_string()).map_err(|e| Status::internal(e.to_string()))?;
        state_db.set_field(CREDENTIALS_TABLE, Some(&key), "last_updated", &now_ns.to_string()).map_err(|e| Status::internal(e.to_string()))?;
        Ok(())
    })();

    if let Err(status) = write_result {
        let _ = host_bus.glome_restore_checkpoint().await;
        restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
        return Err(status);
    }

    let echo = pb::RotateHostParametersResponse { response: Some(pb::rotate_host_parameters_response::Response::Glome(req)) };
    if tx.send(Ok(echo)).await.is_err() {
        let _ = host_bus.glome_restore_checkpoint().await;
        restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
        return Ok(());
    }

    match await_finalize(in_stream).await {
        Ok(()) => {
            let finalize_echo = pb::RotateHostParametersResponse { response: Some(pb::rotate_host_parameters_response::Response::Finalize(pb::FinalizeRequest {})) };
            let _ = tx.send(Ok(finalize_echo)).await;
            Ok(())
        },
        Err(status) => {
            let _ = host_bus.glome_restore_checkpoint().await;
            restore_row(state_db, CREDENTIALS_TABLE, &key, snapshot);
            Err(status)
        },
    }
}

fn now_nanos() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;
    use switchd_db::MemoryDatabase;
    use switchd_hostbus::BusError;

    use super::*;

    #[derive(Default)]
    struct RecordingHostBus {
        ssh_checkpoints: std::sync::Mutex<Vec<CheckpointOp>>,
        console_checkpoints: std::sync::Mutex<Vec<CheckpointOp>>,
        glome_restores: AtomicUsize,
        ssh_mgmt_calls: std::sync::Mutex<Vec<serde_json::Value>>,
        console_set_calls: std::sync::Mutex<Vec<serde_json::Value>>,
        glome_calls: std::sync::Mutex<Vec<serde_json::Value>>,
        fail_glome_set: bool,
    }

    #[async_trait::async_trait]
    impl HostBus for RecordingHostBus {
        async fn ssh_checkpoint(&self, op: CheckpointOp) -> Result<(), BusError> {
            self.ssh_checkpoints.lock().unwrap().push(op);
            Ok(())
        }
        async fn console_checkpoint(&self, op: CheckpointOp) -> Result<(), BusError> {
            self.console_checkpoints.lock().unwrap().push(op);
            Ok(())
        }
        async fn glome_restore_checkpoint(&self) -> Result<(), BusError> {
            self.glome_restores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn glome_config_set(&self, payload: serde_json::Value) -> Result<(), BusError> {
            if self.fail_glome_set {
                return Err(BusError::Failed("glome rejected".to_string()));
            }
            self.glome_calls.lock().unwrap().push(payload);
            Ok(())
        }
        async fn ssh_mgmt_set(&self, payload: serde_json::Value) -> Result<(), BusError> {
            self.ssh_mgmt_calls.lock().unwrap().push(payload);
            Ok(())
        }
        async fn console_set(&self, payload: serde_json::Value) -> Result<(), BusError> {
            self.console_set_calls.lock().unwrap().push(payload);
            Ok(())
        }
        async fn install_os(&self, _payload: serde_json::Value) -> Result<serde_json::Value, BusError> {
            Ok(json!({}))
        }
        async fn factory_reset(&self, _payload: serde_json::Value) -> Result<serde_json::Value, BusError> {
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

    fn state_db() -> Arc<dyn Database> {
        Arc::new(MemoryDatabase::new("STATE_DB"))
    }

    #[test]
    fn can_generate_key_is_limited_to_known_key_types() {
        for ok in ["ssh-ed25519", "ssh-rsa", "ecdsa-sha2-nistp256", "ecdsa-sha2-nistp384"] {
            assert!(matches!(ok, "ssh-ed25519" | "ssh-rsa" | "ecdsa-sha2-nistp256" | "ecdsa-sha2-nistp384"));
        }
        assert!(!matches!("dsa", "ssh-ed25519" | "ssh-rsa" | "ecdsa-sha2-nistp256" | "ecdsa-sha2-nistp384"));
    }

    fn credential_request(account: &str) -> pb::RotateAccountCredentialsRequest {
        pb::RotateAccountCredentialsRequest {
            request: Some(pb::rotate_account_credentials_request::Request::Credential(pb::CredentialRequest {
                accounts: vec![pb::AccountCredential {
                    account: account.to_string(),
                    version: "v1".to_string(),
                    created_on: 1,
                    authorized_keys: vec![pb::AuthorizedKey { keytype: "ssh-ed25519".to_string(), key: b"abc".to_vec(), description: "laptop".to_string(), options: vec![] }],
                }],
            })),
        }
    }

    #[tokio::test]
    async fn account_credentials_rotation_without_finalize_restores_the_checkpoint_and_db_row() {
        let dir = tempfile::tempdir().unwrap();
        let ssh_metadata_path = dir.path().join("ssh_meta.json");
        let console_metadata_path = dir.path().join("console_meta.json");
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus::default());
        let db = state_db();
        db.set_field("CREDENTIALS", Some("SSH_ACCOUNT|admin"), "keys_version", "v0").unwrap();

        let requests = vec![Ok(credential_request("admin"))];
        let (tx, mut rx) = mpsc::channel(8);
        let err = run_rotate_account_credentials(
            stream::iter(requests),
            &host_bus,
            &db,
            &ssh_metadata_path,
            &console_metadata_path,
            SshMetadata::default(),
            ConsoleMetadata::default(),
            &tx,
        )
        .await
        .unwrap_err();
        drop(tx);
        while rx.recv().await.is_some() {}

        assert_eq!(err.code(), tonic::Code::Aborted);
        assert!(!ssh_metadata_path.exists());
        let row = db.get("CREDENTIALS", Some("SSH_ACCOUNT|admin")).unwrap();
        let switchd_db::DbValue::Row(fields) = row else { panic!("expected row") };
        assert_eq!(fields.get("keys_version").unwrap(), "v0");
    }

    #[tokio::test]
    async fn account_credentials_rotation_with_finalize_dispatches_real_payloads_and_writes_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let ssh_metadata_path = dir.path().join("ssh_meta.json");
        let console_metadata_path = dir.path().join("console_meta.json");
        let recording = Arc::new(RecordingHostBus::default());
        let host_bus: Arc<dyn HostBus> = recording.clone();
        let db = state_db();

        let requests = vec![
            Ok(credential_request("admin")),
            Ok(pb::RotateAccountCredentialsRequest {
                request: Some(pb::rotate_account_credentials_request::Request::Password(pb::PasswordRequest {
                    accounts: vec![pb::AccountPassword {
                        account: "admin".to_string(),
                        version: "v1".to_string(),
                        created_on: 1,
                        password: Some(pb::PasswordValue { value: Some(pb::password_value::Value::Plaintext("hunter2".to_string())) }),
                    }],
                })),
            }),
            Ok(pb::RotateAccountCredentialsRequest { request: Some(pb::rotate_account_credentials_request::Request::Finalize(pb::FinalizeRequest {})) }),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        run_rotate_account_credentials(
            stream::iter(requests),
            &host_bus,
            &db,
            &ssh_metadata_path,
            &console_metadata_path,
            SshMetadata::default(),
            ConsoleMetadata::default(),
            &tx,
        )
        .await
        .unwrap();
        drop(tx);
        while rx.recv().await.is_some() {}

        let ssh_payload = &recording.ssh_mgmt_calls.lock().unwrap()[0];
        assert!(ssh_payload.get("SshAccountKeys").is_some());
        let console_payload = &recording.console_set_calls.lock().unwrap()[0];
        assert_eq!(console_payload["ConsolePasswords"][0]["name"], "admin");

        let saved: SshMetadata = serde_json::from_slice(&std::fs::read(&ssh_metadata_path).unwrap()).unwrap();
        assert_eq!(saved.accounts.get("admin").unwrap().keys_version, "v1");
        let row = db.get("CREDENTIALS", Some("SSH_ACCOUNT|admin")).unwrap();
        let switchd_db::DbValue::Row(fields) = row else { panic!("expected row") };
        assert_eq!(fields.get("keys_version").unwrap(), "v1");
        let row = db.get("CREDENTIALS", Some("CONSOLE_ACCOUNT|admin")).unwrap();
        let switchd_db::DbValue::Row(fields) = row else { panic!("expected row") };
        assert_eq!(fields.get("password_version").unwrap(), "v1");
    }

    #[tokio::test]
    async fn host_parameters_rotation_rejects_unimplemented_request_variants() {
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus::default());
        let db = state_db();
        let requests = vec![Ok(pb::RotateHostParametersRequest { request: Some(pb::rotate_host_parameters_request::Request::GenerateKeys(pb::GenerateKeysRequest {})) })];
        let (tx, _rx) = mpsc::channel(8);
        let err = run_rotate_host_parameters(stream::iter(requests), &host_bus, &db, Path::new("/nonexistent"), SshMetadata::default(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unimplemented);
    }

    #[tokio::test]
    async fn glome_rotation_rejects_enabled_false_with_a_stale_key() {
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus::default());
        let db = state_db();
        let requests = vec![Ok(pb::RotateHostParametersRequest {
            request: Some(pb::rotate_host_parameters_request::Request::Glome(pb::GlomeRequest { enabled: false, key: b"leftover".to_vec(), key_version: 0, url_prefix: String::new() })),
        })];
        let (tx, _rx) = mpsc::channel(8);
        let err = run_rotate_host_parameters(stream::iter(requests), &host_bus, &db, Path::new("/nonexistent"), SshMetadata::default(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Aborted);
    }

    #[tokio::test]
    async fn glome_rotation_rejects_enabled_true_without_a_parseable_url() {
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus::default());
        let db = state_db();
        let requests = vec![Ok(pb::RotateHostParametersRequest {
            request: Some(pb::rotate_host_parameters_request::Request::Glome(pb::GlomeRequest { enabled: true, key: b"k".to_vec(), key_version: 1, url_prefix: "not a url".to_string() })),
        })];
        let (tx, _rx) = mpsc::channel(8);
        let err = run_rotate_host_parameters(stream::iter(requests), &host_bus, &db, Path::new("/nonexistent"), SshMetadata::default(), &tx).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Aborted);
    }

    #[tokio::test]
    async fn glome_rotation_commits_state_db_row_and_calls_bus_only_on_finalize() {
        let recording = Arc::new(RecordingHostBus::default());
        let host_bus: Arc<dyn HostBus> = recording.clone();
        let db = state_db();
        let requests = vec![
            Ok(pb::RotateHostParametersRequest {
                request: Some(pb::rotate_host_parameters_request::Request::Glome(pb::GlomeRequest { enabled: true, key: b"k".to_vec(), key_version: 1, url_prefix: "https://glome.example".to_string() })),
            }),
            Ok(pb::RotateHostParametersRequest { request: Some(pb::rotate_host_parameters_request::Request::Finalize(pb::FinalizeRequest {})) }),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        run_rotate_host_parameters(stream::iter(requests), &host_bus, &db, Path::new("/nonexistent"), SshMetadata::default(), &tx).await.unwrap();
        drop(tx);
        while rx.recv().await.is_some() {}

        assert_eq!(recording.glome_calls.lock().unwrap().len(), 1);
        let row = db.get("CREDENTIALS", Some("GLOME_CONFIG")).unwrap();
        let switchd_db::DbValue::Row(fields) = row else { panic!("expected row") };
        assert_eq!(fields.get("enabled").unwrap(), "true");
        assert_eq!(fields.get("key_version").unwrap(), "1");
        assert!(fields.contains_key("last_updated"));
    }

    #[tokio::test]
    async fn glome_rotation_without_finalize_restores_the_prior_row_and_checkpoint() {
        let host_bus: Arc<dyn HostBus> = Arc::new(RecordingHostBus::default());
        let db = state_db();
        db.set_field("CREDENTIALS", Some("GLOME_CONFIG"), "enabled", "false").unwrap();
        let requests = vec![Ok(pb::RotateHostParametersRequest {
            request: Some(pb::rotate_host_parameters_request::Request::Glome(pb::GlomeRequest { enabled: true, key: b"k".to_vec(), key_version: 1, url_prefix: "https://glome.example".to_string() })),
        })];
        let (tx, mut rx) = mpsc::channel(8);
        let err = run_rotate_host_parameters(stream::iter(requests), &host_bus, &db, Path::new("/nonexistent"), SshMetadata::default(), &tx).await.unwrap_err();
        drop(tx);
        while rx.recv().await.is_some() {}

        assert_eq!(err.code(), tonic::Code::Aborted);
        let row = db.get("CREDENTIALS", Some("GLOME_CONFIG")).unwrap();
        let switchd_db::DbValue::Row(fields) = row else { panic!("expected row") };
        assert_eq!(fields.get("enabled").unwrap(), "false");
    }
}
