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

//! Translation bridge. The YANG-schema-driven translation library for the
//! `openconfig:` origin is an external collaborator; this module only specifies the
//! contract the subscription engine drives it through: `Get`/`Set`, and per-path
//! subscription preferences.

use async_trait::async_trait;
use serde_json::Value as Json;
use switchd_db::GnmiPath;

use super::error::SubscribeError;

#[derive(Debug, Clone, Copy)]
pub struct SubscriptionPreference {
    pub on_change_supported: bool,
    pub min_sample_interval_ms: u64,
}

#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn get(&self, path: &GnmiPath) -> Result<Json, SubscribeError>;
    async fn set(&self, path: &GnmiPath, value: Json) -> Result<(), SubscribeError>;
    fn preference(&self, path: &GnmiPath) -> SubscriptionPreference;
}

/// Until switchd is wired to the real YANG translation library, paths routed through
/// it report no on-change support and a one-second default sample interval, and `Get`
/// returns an empty object rather than fabricating openconfig data.
pub struct StubTranslationBackend;

#[async_trait]
impl TranslationBackend for StubTranslationBackend {
    async fn get(&self, _path: &GnmiPath) -> Result<Json, SubscribeError> {
        Ok(Json::Object(Default::default()))
    }

    async fn set(&self, _path: &GnmiPath, _value: Json) -> Result<(), SubscribeError> {
        Err(SubscribeError::Unimplemented("openconfig Set is not wired to a translation backend".to_string()))
    }

    fn preference(&self, _path: &GnmiPath) -> SubscriptionPreference {
        SubscriptionPreference { on_change_supported: false, min_sample_interval_ms: 1000 }
    }
}

/// True when a path should be routed through the translation bridge: explicit
/// `openconfig` origin, or an empty origin whose first element names an
/// `openconfig-*` module.
pub fn uses_translation(origin: &Option<String>, elements_first_name: Option<&str>) -> bool {
    match origin.as_deref() {
        Some("openconfig") => true,
        Some(_) => false,
        None => elements_first_name.map(|n| n.starts_with("openconfig-")).unwrap_or(false),
    }
}
