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

//! Conversions between the generated gNMI wire types and the neutral path/value
//! representation `switchd_db` works with.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value as Json;
use switchd_db::{value::DbValue, value::Fields, GnmiPath, PathElem};
use switchd_grpc::gnmi as pb;

pub fn proto_path_to_gnmi(p: &pb::Path) -> GnmiPath {
    GnmiPath {
        origin: if p.origin.is_empty() { None } else { Some(p.origin.clone()) },
        elements: p.elem.iter().map(proto_elem_to_gnmi).collect(),
    }
}

fn proto_elem_to_gnmi(e: &pb::PathElem) -> PathElem {
    let mut elem = PathElem::new(e.name.clone());
    for (k, v) in &e.key {
        elem.keys.insert(k.clone(), v.clone());
    }
    elem
}

pub fn gnmi_to_proto_path(p: &GnmiPath) -> pb::Path {
    pb::Path {
        origin: p.origin.clone().unwrap_or_default(),
        target: String::new(),
        elem: p
            .elements
            .iter()
            .map(|e| pb::PathElem { name: e.name.clone(), key: e.keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect() })
            .collect(),
    }
}

pub fn now_nanos() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_nanos() as i64
}

/// Builds the `Update` carrying a JSON-encoded value.
pub fn json_update(path: pb::Path, value: &Json) -> pb::Update {
    pb::Update {
        path: Some(path),
        val: Some(pb::TypedValue { value: Some(pb::typed_value::Value::JsonIetfVal(value.to_string())) }),
        duplicates: 0,
    }
}

pub fn db_value_to_json(v: &DbValue) -> Json {
    v.to_json()
}

/// Flattens a JSON object from a `Set` request's `json_ietf_val` into `field -> value`
/// pairs. Scalar JSON values keep their natural string rendering; nested
/// objects/arrays are stored as their JSON text, since the DB access layer only stores
/// strings per field.
pub fn json_to_fields(v: &Json) -> Fields {
    let mut fields = Fields::new();
    if let Json::Object(map) = v {
        for (k, val) in map {
            let s = match val {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.insert(k.clone(), s);
        }
    }
    fields
}

/// Extracts the JSON payload carried by a `TypedValue`, decoding whichever of
/// `json_ietf_val`/`json_val` is set.
pub fn typed_value_to_json(v: &pb::TypedValue) -> Result<Json, serde_json::Error> {
    match &v.value {
        Some(pb::typed_value::Value::JsonIetfVal(s)) | Some(pb::typed_value::Value::JsonVal(s)) => serde_json::from_slice(s.as_bytes()),
        Some(pb::typed_value::Value::StringVal(s)) => Ok(Json::String(s.clone())),
        Some(pb::typed_value::Value::IntVal(i)) => Ok(Json::from(*i)),
        Some(pb::typed_value::Value::UintVal(i)) => Ok(Json::from(*i)),
        Some(pb::typed_value::Value::BoolVal(b)) => Ok(Json::from(*b)),
        None => Ok(Json::Null),
    }
}

pub fn notification_update(prefix: Option<pb::Path>, path: pb::Path, value: &Json) -> pb::Notification {
    pb::Notification { timestamp: now_nanos(), prefix, update: vec![json_update(path, value)], delete: vec![], atomic: false }
}

pub fn notification_delete(prefix: Option<pb::Path>, path: pb::Path) -> pb::Notification {
    pb::Notification { timestamp: now_nanos(), prefix, update: vec![], delete: vec![path], atomic: false }
}

pub fn sync_response() -> pb::SubscribeResponse {
    pb::SubscribeResponse { response: Some(pb::subscribe_response::Response::SyncResponse(true)) }
}

pub fn update_response(n: pb::Notification) -> pb::SubscribeResponse {
    pb::SubscribeResponse { response: Some(pb::subscribe_response::Response::Update(n)) }
}
