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

//! gNMI structured-path <-> DB-path codec.
//!
//! `switchd_db` has no dependency on the wire protocol, so the gNMI-side type here
//! (`GnmiPath`) is a neutral structured-path representation. The gRPC layer converts
//! the generated proto `Path` message into a `GnmiPath` before calling into this module.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathElem {
    pub name: String,
    /// Key name -> key value, in the order they appeared on the wire.
    pub keys: IndexMap<String, String>,
}

impl PathElem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), keys: IndexMap::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnmiPath {
    pub origin: Option<String>,
    pub elements: Vec<PathElem>,
}

impl GnmiPath {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Logical database a subscription/Get/Set targets. `Other` keeps any recognized
/// target name that isn't one of the commonly queried databases, so the agent can grow
/// new logical DBs without a codec change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    ApplDb,
    ConfigDb,
    StateDb,
    CountersDb,
    Other(String),
}

impl Target {
    pub fn parse(raw: &str) -> Option<Target> {
        if raw.is_empty() {
            return None;
        }
        Some(match raw {
            "APPL_DB" => Target::ApplDb,
            "CONFIG_DB" => Target::ConfigDb,
            "STATE_DB" => Target::StateDb,
            "COUNTERS_DB" => Target::CountersDb,
            other => Target::Other(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::ApplDb => "APPL_DB",
            Target::ConfigDb => "CONFIG_DB",
            Target::StateDb => "STATE_DB",
            Target::CountersDb => "COUNTERS_DB",
            Target::Other(s) => s,
        }
    }

    /// `|` for CONFIG_DB/STATE_DB, `:` otherwise.
    pub fn separator(&self) -> char {
        match self {
            Target::ConfigDb | Target::StateDb => '|',
            _ => ':',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPath {
    pub table: String,
    pub keys: Vec<String>,
}

impl DbPath {
    pub fn table_only(table: impl Into<String>) -> Self {
        Self { table: table.into(), keys: Vec::new() }
    }

    pub fn is_table_scoped(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn to_string(&self, sep: char) -> String {
        if self.keys.is_empty() {
            self.table.clone()
        } else {
            let mut s = self.table.clone();
            for k in &self.keys {
                s.push(sep);
                s.push_str(k);
            }
            s
        }
    }

    /// Parse a DB-layer `(table, key)` keyspace-event pair into a `DbPath`, splitting a
    /// compound key (`KEY1<sep>KEY2`) back into its components.
    pub fn from_event(table: &str, key: Option<&str>, sep: char) -> Self {
        match key {
            None => DbPath::table_only(table),
            Some(k) => DbPath { table: table.to_string(), keys: k.split(sep).map(str::to_string).collect() },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("prefix origin {0:?} does not match path origin {1:?}")]
    OriginMismatch(String, String),
    #[error("empty effective path")]
    EmptyPath,
    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

/// Concatenate prefix and path elements into the effective path, validating that
/// origins agree.
pub fn effective_path(prefix: &GnmiPath, path: &GnmiPath) -> Result<Vec<PathElem>, PathError> {
    match (&prefix.origin, &path.origin) {
        (Some(a), Some(b)) if a != b => return Err(PathError::OriginMismatch(a.clone(), b.clone())),
        _ => {},
    }
    let mut out = prefix.elements.clone();
    out.extend(path.elements.iter().cloned());
    Ok(out)
}

/// Map an effective gNMI path to a DB-path: first element is the table name, each
/// subsequent element contributes one key segment (its sole key value if keyed,
/// otherwise its bare name).
pub fn to_db_path(elements: &[PathElem]) -> Result<DbPath, PathError> {
    let (head, rest) = elements.split_first().ok_or(PathError::EmptyPath)?;
    let mut keys = Vec::with_capacity(rest.len());
    for elem in rest {
        if let Some((_, v)) = elem.keys.iter().next() {
            keys.push(v.clone());
        } else {
            keys.push(elem.name.clone());
        }
    }
    Ok(DbPath { table: head.name.clone(), keys })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_only_path_has_no_keys() {
        let elems = vec![PathElem::new("LLDP_ENTRY_TABLE")];
        let db = to_db_path(&elems).unwrap();
        assert_eq!(db.table, "LLDP_ENTRY_TABLE");
        assert!(db.keys.is_empty());
        assert_eq!(db.to_string('|'), "LLDP_ENTRY_TABLE");
    }

    #[test]
    fn table_and_key_path_joins_with_target_separator() {
        let elems = vec![PathElem::new("LLDP_ENTRY_TABLE"), PathElem::new("eth0")];
        let db = to_db_path(&elems).unwrap();
        assert_eq!(db.to_string(Target::ApplDb.separator()), "LLDP_ENTRY_TABLE:eth0");
        assert_eq!(db.to_string(Target::ConfigDb.separator()), "LLDP_ENTRY_TABLE|eth0");
    }

    #[test]
    fn keyed_element_contributes_its_key_value() {
        let mut keyed = PathElem::new("acl-rule");
        keyed.keys.insert("name".to_string(), "RULE_1".to_string());
        let elems = vec![PathElem::new("ACL_RULE_TABLE"), keyed];
        let db = to_db_path(&elems).unwrap();
        assert_eq!(db.keys, vec!["RULE_1".to_string()]);
    }

    #[test]
    fn origin_mismatch_between_prefix_and_path_errors() {
        let prefix = GnmiPath { origin: Some("openconfig".to_string()), elements: vec![] };
        let path = GnmiPath { origin: Some("sonic-db".to_string()), elements: vec![PathElem::new("X")] };
        assert!(matches!(effective_path(&prefix, &path), Err(PathError::OriginMismatch(_, _))));
    }

    #[test]
    fn db_path_from_event_splits_compound_key() {
        let db = DbPath::from_event("ACL_RULE", Some("TABLE1|RULE1"), '|');
        assert_eq!(db.keys, vec!["TABLE1".to_string(), "RULE1".to_string()]);
    }
}
