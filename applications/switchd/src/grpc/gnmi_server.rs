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

//! Wires the generated `gnmi::Gnmi` tonic trait to the DB access layer, the translation
//! bridge, and the subscription engine.

use std::{pin::Pin, sync::Arc};

use futures::{Stream, StreamExt};
use switchd_db::{path::to_db_path, DbError, PathError, Target};
use switchd_grpc::gnmi as pb;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::{
    auth::{Authenticator, ServiceTag},
    grpc::subscribe::{
        self, conv, parse_subscription_list, run_once, run_poll, run_stream, uses_translation, ParsedRequest, SubscribeError,
        StreamModeKind, SubscriptionEngine,
    },
};

pub struct GnmiService {
    engine: Arc<SubscriptionEngine>,
    auth: Arc<dyn Authenticator>,
}

impl GnmiService {
    pub fn new(engine: Arc<SubscriptionEngine>, auth: Arc<dyn Authenticator>) -> Self {
        Self { engine, auth }
    }

    fn resolve_target(prefix: &Option<pb::Path>) -> Result<Option<Target>, Status> {
        prefix
            .as_ref()
            .filter(|p| !p.target.is_empty())
            .map(|p| Target::parse(&p.target).ok_or_else(|| Status::invalid_argument(format!("invalid target {}", p.target))))
            .transpose()
    }
}

fn db_status(e: DbError) -> Status {
    Status::from(SubscribeError::from(e))
}

fn path_status(e: PathError) -> Status {
    Status::from(SubscribeError::from(e))
}

#[tonic::async_trait]
impl pb::gnmi_server::Gnmi for GnmiService {
    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<pb::SubscribeResponse, Status>> + Send + 'static>>;

    async fn capabilities(&self, request: Request<pb::CapabilityRequest>) -> Result<Response<pb::CapabilityResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Gnmi, false)?;
        Ok(Response::new(pb::CapabilityResponse {
            supported_models: vec![],
            supported_encodings: vec![pb::Encoding::JsonIetf as i32, pb::Encoding::Json as i32],
            g_nmi_version: "0.10.0".to_string(),
        }))
    }

    async fn get(&self, request: Request<pb::GetRequest>) -> Result<Response<pb::GetResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Gnmi, false)?;
        let req = request.into_inner();
        let target = Self::resolve_target(&req.prefix)?;
        let prefix_gnmi = req.prefix.as_ref().map(conv::proto_path_to_gnmi).unwrap_or_default();

        let mut notifications = Vec::with_capacity(req.path.len());
        for path in &req.path {
            let gnmi = conv::proto_path_to_gnmi(path);
            let first_name = gnmi.elements.first().map(|e| e.name.as_str());
            let use_translation = uses_translation(&gnmi.origin, first_name);
            let effective = switchd_db::path::effective_path(&prefix_gnmi, &gnmi).map_err(path_status)?;

            let value = if use_translation {
                self.engine.translation.get(&gnmi).await.map_err(Status::from)?
            } else {
                let target = target.as_ref().ok_or_else(|| Status::invalid_argument("missing target for non-openconfig Get path"))?;
                let db_path = to_db_path(&effective).map_err(path_status)?;
                let db = self.engine.db.get(target.as_str()).map_err(db_status)?;
                let key = if db_path.keys.is_empty() { None } else { Some(db_path.keys.join(&target.separator().to_string())) };
                let row = db.get(&db_path.table, key.as_deref()).map_err(db_status)?;
                if row.is_absent() {
                    continue;
                }
                row.to_json()
            };
            notifications.push(conv::notification_update(req.prefix.clone(), path.clone(), &value));
        }
        Ok(Response::new(pb::GetResponse { notification: notifications }))
    }

    async fn set(&self, request: Request<pb::SetRequest>) -> Result<Response<pb::SetResponse>, Status> {
        self.auth.authenticate(&request, ServiceTag::Gnmi, true)?;
        let req = request.into_inner();
        let target = Self::resolve_target(&req.prefix)?.ok_or_else(|| Status::invalid_argument("Set requires a target"))?;
        let prefix_gnmi = req.prefix.as_ref().map(conv::proto_path_to_gnmi).unwrap_or_default();
        let db = self.engine.db.get(target.as_str()).map_err(db_status)?;

        let mut results = Vec::new();
        for path in &req.delete {
            let gnmi = conv::proto_path_to_gnmi(path);
            let effective = switchd_db::path::effective_path(&prefix_gnmi, &gnmi).map_err(path_status)?;
            let db_path = to_db_path(&effective).map_err(path_status)?;
            let key = if db_path.keys.is_empty() { None } else { Some(db_path.keys.join(&target.separator().to_string())) };
            db.del_key(&db_path.table, key.as_deref()).map_err(db_status)?;
            results.push(pb::UpdateResult { path: Some(path.clone()), message: String::new() });
        }
        for update in req.replace.iter().chain(req.update.iter()) {
            let path = update.path.as_ref().ok_or_else(|| Status::invalid_argument("update missing path"))?;
            let gnmi = conv::proto_path_to_gnmi(path);
            let effective = switchd_db::path::effective_path(&prefix_gnmi, &gnmi).map_err(path_status)?;
            let db_path = to_db_path(&effective).map_err(path_status)?;
            let key = if db_path.keys.is_empty() { None } else { Some(db_path.keys.join(&target.separator().to_string())) };
            let value = update.val.as_ref().ok_or_else(|| Status::invalid_argument("update missing value"))?;
            let json = conv::typed_value_to_json(value).map_err(|e| Status::invalid_argument(e.to_string()))?;
            for (field, s) in conv::json_to_fields(&json) {
                db.set_field(&db_path.table, key.as_deref(), &field, &s).map_err(db_status)?;
            }
            results.push(pb::UpdateResult { path: Some(path.clone()), message: String::new() });
        }

        Ok(Response::new(pb::SetResponse { prefix: req.prefix, response: results, timestamp: conv::now_nanos() }))
    }

    async fn subscribe(&self, request: Request<Streaming<pb::SubscribeRequest>>) -> Result<Response<Self::SubscribeStream>, Status> {
        self.auth.authenticate(&request, ServiceTag::Gnmi, true)?;
        let mut in_stream = request.into_inner();

        let first = in_stream
            .next()
            .await
            .ok_or_else(|| Status::invalid_argument("Subscribe stream closed before any request"))??;
        subscribe::validate_extensions(&first.extension).map_err(Status::from)?;

        let list = match first.request {
            Some(pb::subscribe_request::Request::Subscribe(list)) => list,
            _ => return Err(Status::invalid_argument("first SubscribeRequest must be a SubscriptionList")),
        };
        let parsed = parse_subscription_list(&list, self.engine.min_sample_interval, self.engine.translation.as_ref()).map_err(Status::from)?;

        let (tx, rx) = mpsc::channel(32);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result = match parsed.stream_mode {
                StreamModeKind::Once => run_once(&engine, &parsed, &tx).await,
                StreamModeKind::Poll => run_poll_loop(&engine, &parsed, &tx, &mut in_stream).await,
                StreamModeKind::Stream => run_stream(&engine, &parsed, tx.clone()).await,
            };
            if let Err(e) = result {
                let _ = tx.send(Err(Status::from(e))).await;
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx)) as Self::SubscribeStream))
    }
}

async fn run_poll_loop(
    engine: &SubscriptionEngine,
    parsed: &ParsedRequest,
    tx: &mpsc::Sender<Result<pb::SubscribeResponse, Status>>,
    in_stream: &mut Streaming<pb::SubscribeRequest>,
) -> Result<(), SubscribeError> {
    run_poll(engine, parsed, tx).await?;
    loop {
        match in_stream.next().await {
            Some(Ok(req)) => match req.request {
                Some(pb::subscribe_request::Request::Poll(_)) => run_poll(engine, parsed, tx).await?,
                _ => return Ok(()),
            },
            _ => return Ok(()),
        }
    }
}
