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

//! `STREAM` mode: `ON_CHANGE`, `SAMPLE`, and `TARGET_DEFINED`. All three share one
//! delivery loop driven by a fan-in channel fed by small per-subscription tasks
//! (keyspace listener, sample ticker, heartbeat ticker); the loop itself just turns
//! whatever arrives into a notification.

use std::{collections::HashMap, time::Duration};

use log::{debug, warn};
use serde_json::Value as Json;
use switchd_db::{value::encode_change, KeyEvent, KeyOp};
use tokio::{sync::mpsc, task::JoinHandle};
use tonic::Status;

use super::{conv, error::SubscribeError, once_poll, ParsedRequest, ParsedSubscription, SubMode, SubscriptionEngine, LOG_TARGET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectiveMode {
    OnChangeDb,
    OnChangePolled,
    Sample,
}

enum Driver {
    Db { target: String, event: KeyEvent },
    Tick { idx: usize, always_emit: bool },
}

/// Aborts every spawned helper task when the stream handler returns, so a client
/// disconnect doesn't leave keyspace listeners or tickers running forever.
struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn effective_mode(sub: &ParsedSubscription, engine: &SubscriptionEngine) -> EffectiveMode {
    match sub.mode {
        SubMode::OnChange if sub.use_translation => EffectiveMode::OnChangePolled,
        SubMode::OnChange => EffectiveMode::OnChangeDb,
        SubMode::Sample => EffectiveMode::Sample,
        SubMode::TargetDefined if sub.use_translation => {
            if engine.translation.preference(&sub.gnmi).on_change_supported {
                EffectiveMode::OnChangePolled
            } else {
                EffectiveMode::Sample
            }
        },
        SubMode::TargetDefined => EffectiveMode::OnChangeDb,
    }
}

fn sample_interval_ms(sub: &ParsedSubscription, engine: &SubscriptionEngine) -> u64 {
    if sub.sample_interval_ms > 0 {
        return sub.sample_interval_ms;
    }
    if sub.use_translation {
        engine.translation.preference(&sub.gnmi).min_sample_interval_ms
    } else {
        engine.min_sample_interval.as_millis() as u64
    }
}

pub async fn run_stream(
    engine: &SubscriptionEngine,
    req: &ParsedRequest,
    tx: mpsc::Sender<Result<super::pb::SubscribeResponse, Status>>,
) -> Result<(), SubscribeError> {
    let initial = if req.updates_only {
        let mut values = Vec::with_capacity(req.subs.len());
        for sub in &req.subs {
            values.push(once_poll::read_subscription(engine, req, sub).await?);
        }
        values
    } else {
        once_poll::emit_current_values(engine, req, &tx).await?
    };
    if tx.send(Ok(conv::sync_response())).await.is_err() {
        return Ok(());
    }
    let mut last_values: Vec<Option<Json>> = initial;

    let (driver_tx, mut driver_rx) = mpsc::unbounded_channel::<Driver>();
    let mut tasks = Vec::new();
    let mut keyspace_tables: HashMap<String, Vec<String>> = HashMap::new();

    for (idx, sub) in req.subs.iter().enumerate() {
        match effective_mode(sub, engine) {
            EffectiveMode::OnChangeDb => {
                let target = req.target.as_ref().ok_or_else(|| SubscribeError::Internal("missing target".to_string()))?;
                let db_path = sub.db_path.as_ref().ok_or_else(|| SubscribeError::Internal("missing db path".to_string()))?;
                keyspace_tables.entry(target.as_str().to_string()).or_default().push(db_path.table.clone());

                if sub.heartbeat_interval_ms > 0 {
                    tasks.push(spawn_ticker(driver_tx.clone(), idx, sub.heartbeat_interval_ms, true));
                }
            },
            EffectiveMode::OnChangePolled => {
                tasks.push(spawn_ticker(driver_tx.clone(), idx, sample_interval_ms(sub, engine), false));
            },
            EffectiveMode::Sample => {
                tasks.push(spawn_ticker(driver_tx.clone(), idx, sample_interval_ms(sub, engine), !sub.suppress_redundant));
                if sub.heartbeat_interval_ms > 0 {
                    tasks.push(spawn_ticker(driver_tx.clone(), idx, sub.heartbeat_interval_ms, true));
                }
            },
        }
    }

    for (target, mut tables) in keyspace_tables {
        tables.sort();
        tables.dedup();
        let db = engine.db.get(&target)?;
        let mut rx = db.subscribe_keyspace(tables).await?;
        let driver_tx = driver_tx.clone();
        let target_name = target.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if driver_tx.send(Driver::Db { target: target_name.clone(), event }).is_err() {
                    break;
                }
            }
        }));
    }
    drop(driver_tx);

    let _guard = TaskGuard(tasks);

    while let Some(driver) = driver_rx.recv().await {
        let closed = match driver {
            Driver::Db { target, event } => handle_db_event(req, &tx, &target, &event).await?,
            Driver::Tick { idx, always_emit } => handle_tick(engine, req, &tx, &mut last_values, idx, always_emit).await?,
        };
        if closed {
            break;
        }
    }
    Ok(())
}

fn spawn_ticker(driver_tx: mpsc::UnboundedSender<Driver>, idx: usize, interval_ms: u64, always_emit: bool) -> JoinHandle<()> {
    let period = Duration::from_millis(interval_ms.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if driver_tx.send(Driver::Tick { idx, always_emit }).is_err() {
                break;
            }
        }
    })
}

/// Returns `true` once the client has gone away and the stream loop should stop.
async fn handle_db_event(
    req: &ParsedRequest,
    tx: &mpsc::Sender<Result<super::pb::SubscribeResponse, Status>>,
    target: &str,
    event: &KeyEvent,
) -> Result<bool, SubscribeError> {
    let sep = req.target.as_ref().map(|t| t.separator()).unwrap_or(':');
    for sub in &req.subs {
        if sub.use_translation {
            continue;
        }
        let Some(db_path) = &sub.db_path else { continue };
        if req.target.as_ref().map(|t| t.as_str()) != Some(target) || db_path.table != event.table {
            continue;
        }
        let table_scoped = db_path.keys.is_empty();
        if !table_scoped {
            let sub_key = db_path.keys.join(&sep.to_string());
            if sub_key != event.key {
                continue;
            }
        }

        let notification = match event.op {
            KeyOp::Set => {
                let json = encode_change(table_scoped, &event.key, &event.fields);
                conv::notification_update(req.proto_prefix.clone(), conv::gnmi_to_proto_path(&sub.gnmi), &json)
            },
            KeyOp::Del => {
                let mut gnmi = sub.gnmi.clone();
                if table_scoped {
                    gnmi.elements.push(switchd_db::PathElem::new(event.key.clone()));
                }
                conv::notification_delete(req.proto_prefix.clone(), conv::gnmi_to_proto_path(&gnmi))
            },
        };
        if tx.send(Ok(conv::update_response(notification))).await.is_err() {
            debug!(target: LOG_TARGET, "client dropped stream on keyspace event");
            return Ok(true);
        }
    }
    Ok(false)
}

async fn handle_tick(
    engine: &SubscriptionEngine,
    req: &ParsedRequest,
    tx: &mpsc::Sender<Result<super::pb::SubscribeResponse, Status>>,
    last_values: &mut [Option<Json>],
    idx: usize,
    always_emit: bool,
) -> Result<bool, SubscribeError> {
    let sub = &req.subs[idx];
    let value = once_poll::read_subscription(engine, req, sub).await?;

    if !always_emit && value == last_values[idx] {
        return Ok(false);
    }

    let response = match &value {
        Some(json) => conv::update_response(conv::notification_update(req.proto_prefix.clone(), conv::gnmi_to_proto_path(&sub.gnmi), json)),
        None if last_values[idx].is_some() => {
            conv::update_response(conv::notification_delete(req.proto_prefix.clone(), conv::gnmi_to_proto_path(&sub.gnmi)))
        },
        None => {
            last_values[idx] = value;
            return Ok(false);
        },
    };

    last_values[idx] = value;
    if tx.send(Ok(response)).await.is_err() {
        warn!(target: LOG_TARGET, "client dropped stream on sample tick");
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchd_db::{value::Fields, DbConnector, DbPath, GnmiPath, PathElem, Target};
    use tokio::time::timeout;

    use super::*;
    use crate::grpc::subscribe::{pb, translation::StubTranslationBackend};

    fn sub(table: &str, key: &str, mode: SubMode, sample_ms: u64) -> ParsedSubscription {
        ParsedSubscription {
            original: pb::Path::default(),
            gnmi: GnmiPath { origin: None, elements: vec![PathElem::new(table), PathElem::new(key)] },
            db_path: Some(DbPath { table: table.to_string(), keys: vec![key.to_string()] }),
            use_translation: false,
            mode,
            sample_interval_ms: sample_ms,
            heartbeat_interval_ms: 0,
            suppress_redundant: false,
        }
    }

    #[tokio::test]
    async fn on_change_emits_update_on_keyspace_set() {
        let db = Arc::new(DbConnector::new());
        let engine = SubscriptionEngine::new(db.clone(), Arc::new(StubTranslationBackend), Duration::from_millis(50));
        let req = ParsedRequest {
            proto_prefix: None,
            target: Some(Target::ApplDb),
            stream_mode: super::super::StreamModeKind::Stream,
            subs: vec![sub("LLDP_ENTRY_TABLE", "eth0", SubMode::OnChange, 0)],
            updates_only: false,
        };
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { run_stream(&engine, &req, tx).await });

        let sync = rx.recv().await.unwrap().unwrap();
        assert!(matches!(sync.response, Some(pb::subscribe_response::Response::SyncResponse(true))));

        let mem = db.memory("APPL_DB").unwrap();
        let mut fields = Fields::new();
        fields.insert("lldp_rem_port_id".to_string(), "dummy".to_string());
        mem.insert_row("LLDP_ENTRY_TABLE", "eth0", fields);

        let update = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap().unwrap();
        assert!(matches!(update.response, Some(pb::subscribe_response::Response::Update(_))));

        handle.abort();
    }

    #[tokio::test]
    async fn updates_only_suppresses_the_initial_snapshot() {
        let db = Arc::new(DbConnector::new());
        let mem = db.memory("APPL_DB").unwrap();
        let mut fields = Fields::new();
        fields.insert("lldp_rem_port_id".to_string(), "dummy".to_string());
        mem.insert_row("LLDP_ENTRY_TABLE", "eth0", fields);

        let engine = SubscriptionEngine::new(db.clone(), Arc::new(StubTranslationBackend), Duration::from_millis(50));
        let req = ParsedRequest {
            proto_prefix: None,
            target: Some(Target::ApplDb),
            stream_mode: super::super::StreamModeKind::Stream,
            subs: vec![sub("LLDP_ENTRY_TABLE", "eth0", SubMode::OnChange, 0)],
            updates_only: true,
        };
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { run_stream(&engine, &req, tx).await });

        let first = rx.recv().await.unwrap().unwrap();
        assert!(matches!(first.response, Some(pb::subscribe_response::Response::SyncResponse(true))), "updates_only must suppress the initial snapshot, only sync is emitted");

        handle.abort();
    }

    #[tokio::test]
    async fn sample_emits_on_tick_then_suppresses_redundant() {
        let db = Arc::new(DbConnector::new());
        let mem = db.memory("APPL_DB").unwrap();
        let mut fields = Fields::new();
        fields.insert("speed".to_string(), "100000".to_string());
        mem.insert_row("PORT_TABLE", "Ethernet0", fields);

        let engine = SubscriptionEngine::new(db.clone(), Arc::new(StubTranslationBackend), Duration::from_millis(10));
        let mut s = sub("PORT_TABLE", "Ethernet0", SubMode::Sample, 30);
        s.suppress_redundant = true;
        let req = ParsedRequest {
            proto_prefix: None,
            target: Some(Target::ApplDb),
            stream_mode: super::super::StreamModeKind::Stream,
            subs: vec![s],
            updates_only: false,
        };
        let (tx, mut rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move { run_stream(&engine, &req, tx).await });

        let sync = rx.recv().await.unwrap().unwrap();
        assert!(matches!(sync.response, Some(pb::subscribe_response::Response::SyncResponse(true))));

        let res = timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(res.is_err(), "unchanged sample should not be re-emitted while suppress_redundant is set");

        handle.abort();
    }
}
