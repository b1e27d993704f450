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

//! The DB access layer. The underlying key-value engine and its pub/sub primitives are
//! an external collaborator; this module only specifies the contract switchd needs from
//! it (`Database`) and ships one concrete, thread-safe
//! in-memory implementation that the agent uses as its logical-DB backing until it is
//! wired to the real engine, and that tests use as a fake.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;

use crate::{
    error::DbError,
    value::{DbValue, Fields, TableRows},
};

const LOG_TARGET: &str = "switchd::db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOp {
    Set,
    Del,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub table: String,
    pub key: String,
    pub op: KeyOp,
    /// Populated for `Set` (the freshly re-read row); empty for `Del`.
    pub fields: Fields,
}

/// The per-logical-database contract the subscription engine, `Get`/`Set`
/// handlers, and the credential/Certz freshness writers all use.
#[async_trait]
pub trait Database: Send + Sync {
    fn get_keys(&self, table: &str) -> Result<Vec<String>, DbError>;

    /// `key = None` reads the whole table; `Some(key)` reads one row.
    fn get(&self, table: &str, key: Option<&str>) -> Result<DbValue, DbError>;

    fn set_field(&self, table: &str, key: Option<&str>, field: &str, value: &str) -> Result<(), DbError>;

    fn del_key(&self, table: &str, key: Option<&str>) -> Result<(), DbError>;

    /// Subscribe to keyspace events for the given tables. The returned receiver yields
    /// events for as long as the subscription handle (discarded by the caller on
    /// unsubscribe) is alive.
    async fn subscribe_keyspace(&self, tables: Vec<String>) -> Result<mpsc::UnboundedReceiver<KeyEvent>, DbError>;
}

struct Subscriber {
    tables: Vec<String>,
    tx: mpsc::UnboundedSender<KeyEvent>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, TableRows>,
    subscribers: Vec<Subscriber>,
}

/// Thread-safe in-memory logical database.
pub struct MemoryDatabase {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), inner: Mutex::new(Inner::default()) }
    }

    fn publish(inner: &mut Inner, event: KeyEvent) {
        inner.subscribers.retain_mut(|sub| {
            if sub.tables.is_empty() || sub.tables.iter().any(|t| t == &event.table) {
                sub.tx.send(event.clone()).is_ok()
            } else {
                true
            }
        });
    }

    /// Test/bootstrap helper: set a whole row in one call, firing a keyspace event.
    pub fn insert_row(&self, table: &str, key: &str, fields: Fields) {
        let mut inner = self.inner.lock().expect("db mutex poisoned");
        inner.tables.entry(table.to_string()).or_default().insert(key.to_string(), fields.clone());
        let event = KeyEvent { table: table.to_string(), key: key.to_string(), op: KeyOp::Set, fields };
        Self::publish(&mut inner, event);
    }

    pub fn remove_row(&self, table: &str, key: &str) {
        let mut inner = self.inner.lock().expect("db mutex poisoned");
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.shift_remove(key);
        }
        let event = KeyEvent { table: table.to_string(), key: key.to_string(), op: KeyOp::Del, fields: Fields::new() };
        Self::publish(&mut inner, event);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn get_keys(&self, table: &str) -> Result<Vec<String>, DbError> {
        let inner = self.inner.lock().expect("db mutex poisoned");
        Ok(inner.tables.get(table).map(|rows| rows.keys().cloned().collect()).unwrap_or_default())
    }

    fn get(&self, table: &str, key: Option<&str>) -> Result<DbValue, DbError> {
        let inner = self.inner.lock().expect("db mutex poisoned");
        let Some(rows) = inner.tables.get(table) else {
            return Ok(DbValue::Absent);
        };
        match key {
            None => Ok(DbValue::Table(rows.clone())),
            Some(k) => match rows.get(k) {
                Some(fields) => Ok(DbValue::Row(fields.clone())),
                None => Ok(DbValue::Absent),
            },
        }
    }

    fn set_field(&self, table: &str, key: Option<&str>, field: &str, value: &str) -> Result<(), DbError> {
        let mut inner = self.inner.lock().expect("db mutex poisoned");
        let row_key = key.unwrap_or("").to_string();
        let rows = inner.tables.entry(table.to_string()).or_default();
        let fields = rows.entry(row_key.clone()).or_default();
        fields.insert(field.to_string(), value.to_string());
        let fields = fields.clone();
        debug!(target: LOG_TARGET, "set {}[{}].{} = {}", table, row_key, field, value);
        Self::publish(&mut inner, KeyEvent { table: table.to_string(), key: row_key, op: KeyOp::Set, fields });
        Ok(())
    }

    fn del_key(&self, table: &str, key: Option<&str>) -> Result<(), DbError> {
        let mut inner = self.inner.lock().expect("db mutex poisoned");
        let row_key = key.unwrap_or("").to_string();
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.shift_remove(&row_key);
        }
        Self::publish(
            &mut inner,
            KeyEvent { table: table.to_string(), key: row_key, op: KeyOp::Del, fields: Fields::new() },
        );
        Ok(())
    }

    async fn subscribe_keyspace(&self, tables: Vec<String>) -> Result<mpsc::UnboundedReceiver<KeyEvent>, DbError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("db mutex poisoned");
        inner.subscribers.push(Subscriber { tables, tx });
        Ok(rx)
    }
}

/// Connects logical-DB targets to their backing `Database`. One process-wide instance,
/// constructed at server startup and shared via `Arc` as a long-lived singleton routed
/// through the server object.
pub struct DbConnector {
    dbs: HashMap<String, Arc<MemoryDatabase>>,
}

impl DbConnector {
    pub fn new() -> Self {
        let mut dbs = HashMap::new();
        for name in ["APPL_DB", "CONFIG_DB", "STATE_DB", "COUNTERS_DB"] {
            dbs.insert(name.to_string(), Arc::new(MemoryDatabase::new(name)));
        }
        Self { dbs }
    }

    pub fn get(&self, target: &str) -> Result<Arc<dyn Database>, DbError> {
        self.dbs
            .get(target)
            .cloned()
            .map(|db| db as Arc<dyn Database>)
            .ok_or_else(|| DbError::UnknownTarget(target.to_string()))
    }

    /// Exposes the concrete in-memory backend for tests/bootstrap that need to seed
    /// rows directly rather than through the trait's field-at-a-time `set_field`.
    pub fn memory(&self, target: &str) -> Option<Arc<MemoryDatabase>> {
        self.dbs.get(target).cloned()
    }
}

impl Default for DbConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_field_creates_table_and_fires_event() {
        let db = MemoryDatabase::new("APPL_DB");
        let mut rx = db.subscribe_keyspace(vec!["LLDP_ENTRY_TABLE".to_string()]).await.unwrap();
        db.set_field("LLDP_ENTRY_TABLE", Some("eth0"), "lldp_rem_port_id", "dummy").unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.table, "LLDP_ENTRY_TABLE");
        assert_eq!(ev.key, "eth0");
        assert_eq!(ev.op, KeyOp::Set);
        assert_eq!(ev.fields.get("lldp_rem_port_id").unwrap(), "dummy");
    }

    #[test]
    fn absent_table_returns_absent_not_error() {
        let db = MemoryDatabase::new("APPL_DB");
        assert!(db.get("NOPE", Some("k")).unwrap().is_absent());
    }

    #[tokio::test]
    async fn del_key_fires_del_event_with_empty_fields() {
        let db = MemoryDatabase::new("APPL_DB");
        db.set_field("T", Some("k"), "f", "v").unwrap();
        let mut rx = db.subscribe_keyspace(vec!["T".to_string()]).await.unwrap();
        db.del_key("T", Some("k")).unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.op, KeyOp::Del);
        assert!(ev.fields.is_empty());
        assert!(db.get("T", Some("k")).unwrap().is_absent());
    }
}
