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

//! The subscription engine. Owns the per-client outbound queue and drives
//! `ONCE`/`POLL`/`STREAM` semantics over either the DB access layer or the translation
//! bridge.

pub mod conv;
pub mod error;
pub mod once_poll;
pub mod stream;
pub mod translation;

use std::{sync::Arc, time::Duration};

use switchd_db::{path::to_db_path, DbConnector, DbPath, GnmiPath, Target};
pub use switchd_grpc::gnmi as pb;

pub use error::SubscribeError;
pub use once_poll::{run_once, run_poll};
pub use stream::run_stream;
pub use translation::{uses_translation, StubTranslationBackend, SubscriptionPreference, TranslationBackend};

pub const LOG_TARGET: &str = "switchd::grpc::subscribe";

/// Bundle-version strings the engine recognizes besides the unversioned sentinel
/// `0.0.0`.
const KNOWN_BUNDLE_VERSIONS: &[&str] = &["1.0.0"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamModeKind {
    Once,
    Poll,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMode {
    OnChange,
    Sample,
    TargetDefined,
}

#[derive(Debug, Clone)]
pub struct ParsedSubscription {
    pub original: pb::Path,
    pub gnmi: GnmiPath,
    pub db_path: Option<DbPath>,
    pub use_translation: bool,
    pub mode: SubMode,
    pub sample_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub suppress_redundant: bool,
}

pub struct ParsedRequest {
    pub proto_prefix: Option<pb::Path>,
    pub target: Option<Target>,
    pub stream_mode: StreamModeKind,
    pub subs: Vec<ParsedSubscription>,
    pub updates_only: bool,
}

/// Engine entry point: validate the extension list, then the subscription list itself.
pub fn validate_extensions(extensions: &[pb::Extension]) -> Result<(), SubscribeError> {
    for ext in extensions {
        if let Some(pb::extension::Ext::BundleVersion(bv)) = &ext.ext {
            if bv.version != "0.0.0" && !KNOWN_BUNDLE_VERSIONS.contains(&bv.version.as_str()) {
                return Err(SubscribeError::InvalidArgument(format!("unsupported bundle version {}", bv.version)));
            }
        }
    }
    Ok(())
}

pub fn parse_subscription_list(
    list: &pb::SubscriptionList,
    min_sample_interval: Duration,
    backend: &dyn TranslationBackend,
) -> Result<ParsedRequest, SubscribeError> {
    let stream_mode = match pb::StreamMode::try_from(list.mode) {
        Ok(pb::StreamMode::Once) => StreamModeKind::Once,
        Ok(pb::StreamMode::Poll) => StreamModeKind::Poll,
        Ok(pb::StreamMode::Stream) => StreamModeKind::Stream,
        Err(_) => return Err(SubscribeError::InvalidArgument("unrecognized subscription list mode".to_string())),
    };

    let proto_prefix = list.prefix.clone();
    let prefix_gnmi = proto_prefix.as_ref().map(conv::proto_path_to_gnmi).unwrap_or_default();
    let target = proto_prefix
        .as_ref()
        .filter(|p| !p.target.is_empty())
        .map(|p| Target::parse(&p.target).ok_or_else(|| SubscribeError::InvalidArgument(format!("invalid target {}", p.target))))
        .transpose()?;

    let mut subs = Vec::with_capacity(list.subscription.len());
    for sub in &list.subscription {
        let original = sub.path.clone().ok_or_else(|| SubscribeError::InvalidArgument("subscription missing path".to_string()))?;
        let gnmi = conv::proto_path_to_gnmi(&original);
        let first_name = gnmi.elements.first().map(|e| e.name.as_str());
        let use_translation = uses_translation(&gnmi.origin, first_name);

        let effective = switchd_db::path::effective_path(&prefix_gnmi, &gnmi)?;
        let db_path = if use_translation { None } else { Some(to_db_path(&effective)?) };

        if !use_translation && target.is_none() {
            return Err(SubscribeError::InvalidArgument("missing target for non-openconfig subscription".to_string()));
        }

        let mode = match pb::SubscriptionMode::try_from(sub.mode) {
            Ok(pb::SubscriptionMode::OnChange) => SubMode::OnChange,
            Ok(pb::SubscriptionMode::Sample) => SubMode::Sample,
            Ok(pb::SubscriptionMode::TargetDefined) => SubMode::TargetDefined,
            Err(_) => return Err(SubscribeError::InvalidArgument("unrecognized subscription mode".to_string())),
        };

        if stream_mode == StreamModeKind::Stream {
            validate_stream_subscription(&gnmi, mode, sub.sample_interval, sub.heartbeat_interval, min_sample_interval, use_translation, backend)?;
        }

        subs.push(ParsedSubscription {
            original,
            gnmi,
            db_path,
            use_translation,
            mode,
            sample_interval_ms: sub.sample_interval,
            heartbeat_interval_ms: sub.heartbeat_interval,
            suppress_redundant: sub.suppress_redundant,
        });
    }

    Ok(ParsedRequest { proto_prefix, target, stream_mode, subs, updates_only: list.updates_only })
}

fn validate_stream_subscription(
    path: &GnmiPath,
    mode: SubMode,
    sample_interval_ms: u64,
    heartbeat_interval_ms: u64,
    min_sample_interval: Duration,
    use_translation: bool,
    backend: &dyn TranslationBackend,
) -> Result<(), SubscribeError> {
    let pref = if use_translation { Some(backend.preference(path)) } else { None };

    match mode {
        SubMode::OnChange => {
            if let Some(pref) = pref {
                if !pref.on_change_supported {
                    return Err(SubscribeError::InvalidArgument(format!(
                        "path does not support ON_CHANGE: {:?}",
                        path
                    )));
                }
            }
        },
        SubMode::Sample | SubMode::TargetDefined => {
            let floor_ms = min_sample_interval.as_millis() as u64;
            if sample_interval_ms != 0 && sample_interval_ms < floor_ms {
                return Err(SubscribeError::InvalidArgument(format!(
                    "sample_interval {}ms below floor {}ms",
                    sample_interval_ms, floor_ms
                )));
            }
            if heartbeat_interval_ms > 0 && sample_interval_ms != 0 && heartbeat_interval_ms < sample_interval_ms {
                return Err(SubscribeError::InvalidArgument(
                    "heartbeat_interval must be >= sample_interval".to_string(),
                ));
            }
        },
    }
    Ok(())
}

/// Resolves the separator for a `ParsedSubscription`'s target, used by `to_string` on
/// its `DbPath` and by keyspace-event matching.
pub fn separator_for(target: &Option<Target>) -> char {
    target.as_ref().map(|t| t.separator()).unwrap_or(':')
}

/// Everything the engine needs to serve one `Subscribe` stream: the logical-DB
/// connector, the translation bridge, and the configured minimum sample interval.
pub struct SubscriptionEngine {
    pub db: Arc<DbConnector>,
    pub translation: Arc<dyn TranslationBackend>,
    pub min_sample_interval: Duration,
}

impl SubscriptionEngine {
    pub fn new(db: Arc<DbConnector>, translation: Arc<dyn TranslationBackend>, min_sample_interval: Duration) -> Self {
        Self { db, translation, min_sample_interval }
    }
}
