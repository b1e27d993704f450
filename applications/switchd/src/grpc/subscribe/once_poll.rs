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

//! `ONCE` and `POLL` delivery: both read the current value of every subscribed path and
//! send it down, differing only in when that read happens (once at stream start, or once
//! per incoming `Poll` message) and in who triggers the close.

use log::warn;
use switchd_db::value::DbValue;
use tokio::sync::mpsc;
use tonic::Status;

use super::{conv, error::SubscribeError, ParsedRequest, ParsedSubscription, SubscriptionEngine, LOG_TARGET};

/// Reads every subscription's current value and sends one `Update` notification per
/// present path, skipping paths whose table or key does not currently exist (absent is
/// not an error, it simply contributes no notification).
pub(crate) async fn emit_current_values(
    engine: &SubscriptionEngine,
    req: &ParsedRequest,
    tx: &mpsc::Sender<Result<super::pb::SubscribeResponse, Status>>,
) -> Result<Vec<Option<serde_json::Value>>, SubscribeError> {
    let mut values = Vec::with_capacity(req.subs.len());
    for sub in &req.subs {
        let value = read_subscription(engine, req, sub).await?;
        if let Some(json) = &value {
            let path = conv::gnmi_to_proto_path(&sub.gnmi);
            let notification = conv::notification_update(req.proto_prefix.clone(), path, json);
            if tx.send(Ok(conv::update_response(notification))).await.is_err() {
                warn!(target: LOG_TARGET, "client dropped stream mid-read");
                values.push(value);
                continue;
            }
        }
        values.push(value);
    }
    Ok(values)
}

pub(crate) async fn read_subscription(
    engine: &SubscriptionEngine,
    req: &ParsedRequest,
    sub: &ParsedSubscription,
) -> Result<Option<serde_json::Value>, SubscribeError> {
    if sub.use_translation {
        let json = engine.translation.get(&sub.gnmi).await?;
        return Ok(Some(json));
    }

    let target = req.target.as_ref().ok_or_else(|| SubscribeError::Internal("db-routed subscription missing target".to_string()))?;
    let db_path = sub.db_path.as_ref().ok_or_else(|| SubscribeError::Internal("db-routed subscription missing db path".to_string()))?;
    let db = engine.db.get(target.as_str())?;

    let key = if db_path.keys.is_empty() { None } else { Some(db_path.keys.join(&target.separator().to_string())) };
    let value = db.get(&db_path.table, key.as_deref())?;
    if value.is_absent() {
        return Ok(None);
    }
    Ok(Some(match value {
        DbValue::Table(_) | DbValue::Row(_) => value.to_json(),
        DbValue::Absent => unreachable!(),
    }))
}

/// `ONCE`: emit the current value of every subscription, then `SyncResponse`, then the
/// caller closes the stream.
pub async fn run_once(
    engine: &SubscriptionEngine,
    req: &ParsedRequest,
    tx: &mpsc::Sender<Result<super::pb::SubscribeResponse, Status>>,
) -> Result<(), SubscribeError> {
    emit_current_values(engine, req, tx).await?;
    let _ = tx.send(Ok(conv::sync_response())).await;
    Ok(())
}

/// `POLL`: identical read-and-emit-current-values behaviour as `ONCE`, but driven once
/// per incoming `Poll` request message rather than once at stream start, and the stream
/// stays open across polls.
pub async fn run_poll(
    engine: &SubscriptionEngine,
    req: &ParsedRequest,
    tx: &mpsc::Sender<Result<super::pb::SubscribeResponse, Status>>,
) -> Result<(), SubscribeError> {
    emit_current_values(engine, req, tx).await?;
    let _ = tx.send(Ok(conv::sync_response())).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use switchd_db::{value::Fields, DbConnector};

    use super::*;
    use crate::grpc::subscribe::{pb, translation::StubTranslationBackend, SubMode};

    fn engine() -> SubscriptionEngine {
        SubscriptionEngine::new(Arc::new(DbConnector::new()), Arc::new(StubTranslationBackend), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn once_skips_absent_key_and_still_syncs() {
        let engine = engine();
        let sub = ParsedSubscription {
            original: pb::Path::default(),
            gnmi: switchd_db::GnmiPath { origin: None, elements: vec![switchd_db::PathElem::new("LLDP_ENTRY_TABLE"), switchd_db::PathElem::new("eth0")] },
            db_path: Some(switchd_db::DbPath { table: "LLDP_ENTRY_TABLE".to_string(), keys: vec!["eth0".to_string()] }),
            use_translation: false,
            mode: SubMode::OnChange,
            sample_interval_ms: 0,
            heartbeat_interval_ms: 0,
            suppress_redundant: false,
        };
        let req = ParsedRequest {
            proto_prefix: None,
            target: Some(switchd_db::Target::ApplDb),
            stream_mode: super::super::StreamModeKind::Once,
            subs: vec![sub],
            updates_only: false,
        };
        let (tx, mut rx) = mpsc::channel(8);
        run_once(&engine, &req, &tx).await.unwrap();
        drop(tx);
        let first = rx.recv().await.unwrap().unwrap();
        assert!(matches!(first.response, Some(pb::subscribe_response::Response::SyncResponse(true))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn once_emits_present_row_then_sync() {
        let engine = engine();
        let mem = engine.db.memory("APPL_DB").unwrap();
        let mut fields = Fields::new();
        fields.insert("lldp_rem_port_id".to_string(), "dummy".to_string());
        mem.insert_row("LLDP_ENTRY_TABLE", "eth0", fields);

        let sub = ParsedSubscription {
            original: pb::Path::default(),
            gnmi: switchd_db::GnmiPath { origin: None, elements: vec![switchd_db::PathElem::new("LLDP_ENTRY_TABLE"), switchd_db::PathElem::new("eth0")] },
            db_path: Some(switchd_db::DbPath { table: "LLDP_ENTRY_TABLE".to_string(), keys: vec!["eth0".to_string()] }),
            use_translation: false,
            mode: SubMode::OnChange,
            sample_interval_ms: 0,
            heartbeat_interval_ms: 0,
            suppress_redundant: false,
        };
        let req = ParsedRequest {
            proto_prefix: None,
            target: Some(switchd_db::Target::ApplDb),
            stream_mode: super::super::StreamModeKind::Once,
            subs: vec![sub],
            updates_only: false,
        };
        let (tx, mut rx) = mpsc::channel(8);
        run_once(&engine, &req, &tx).await.unwrap();
        let update = rx.recv().await.unwrap().unwrap();
        assert!(matches!(update.response, Some(pb::subscribe_response::Response::Update(_))));
        let sync = rx.recv().await.unwrap().unwrap();
        assert!(matches!(sync.response, Some(pb::subscribe_response::Response::SyncResponse(true))));
    }
}
