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

//! Typed replacement for the dynamically-typed rows the underlying database hands back.
//! Field order is preserved end to end so JSON emitted to a gNMI client matches the
//! order the fields were written in (relied on by the keyspace-notification encoding
//! in switchd's subscription engine).

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

/// One row's worth of `field -> value` pairs, in insertion order.
pub type Fields = IndexMap<String, String>;

/// A full table snapshot: `key -> fields`, in the order keys were returned by the DB.
pub type TableRows = IndexMap<String, Fields>;

/// Result of resolving a DB-path: either an entire table, a single key's fields, or
/// nothing (table/key absent, not an error).
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Table(TableRows),
    Row(Fields),
    Absent,
}

impl DbValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, DbValue::Absent)
    }

    /// A table-scoped subscription yields `{ key1: {field1: v1, ...}, ... }`; a
    /// key-scoped subscription yields `{ field1: v1, ... }` directly.
    pub fn to_json(&self) -> Json {
        match self {
            DbValue::Table(rows) => {
                let mut out = Map::new();
                for (key, fields) in rows {
                    out.insert(key.clone(), fields_to_json(fields));
                }
                Json::Object(out)
            },
            DbValue::Row(fields) => fields_to_json(fields),
            DbValue::Absent => Json::Object(Map::new()),
        }
    }
}

fn fields_to_json(fields: &Fields) -> Json {
    let mut out = Map::new();
    for (k, v) in fields {
        out.insert(k.clone(), Json::String(v.clone()));
    }
    Json::Object(out)
}

/// Encode a single on-change keyspace event: for a table-scoped subscription,
/// `{ key: { field: value, ... } }`; for a key-scoped subscription the fields are
/// emitted directly without the outer key wrapper.
pub fn encode_change(table_scoped: bool, key: &str, fields: &Fields) -> Json {
    if table_scoped {
        let mut out = Map::new();
        out.insert(key.to_string(), fields_to_json(fields));
        Json::Object(out)
    } else {
        fields_to_json(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_encodes_without_key_wrapper() {
        let mut fields = Fields::new();
        fields.insert("lldp_rem_port_id".to_string(), "dummy".to_string());
        fields.insert("lldp_rem_sys_name".to_string(), "dummy".to_string());
        let v = DbValue::Row(fields);
        assert_eq!(
            v.to_json(),
            serde_json::json!({"lldp_rem_port_id": "dummy", "lldp_rem_sys_name": "dummy"})
        );
    }

    #[test]
    fn table_encodes_with_key_wrapper_in_order() {
        let mut fields = Fields::new();
        fields.insert("lldp_rem_port_id".to_string(), "dummy".to_string());
        fields.insert("lldp_rem_sys_name".to_string(), "dummy".to_string());
        let mut rows = TableRows::new();
        rows.insert("eth0".to_string(), fields);
        let v = DbValue::Table(rows);
        assert_eq!(
            v.to_json(),
            serde_json::json!({"eth0": {"lldp_rem_port_id": "dummy", "lldp_rem_sys_name": "dummy"}})
        );
    }

    #[test]
    fn absent_table_has_no_entries() {
        assert_eq!(DbValue::Absent.to_json(), serde_json::json!({}));
    }
}
