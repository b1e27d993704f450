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

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BusError {
    #[error("host-service bus call not implemented: {0}")]
    Unimplemented(String),
    #[error("host-service bus call failed: {0}")]
    Failed(String),
    #[error("host-service bus payload error: {0}")]
    Codec(String),
}

impl BusError {
    /// `true` when the bus itself reported the requested operation is unsupported on
    /// this platform.
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, BusError::Unimplemented(_))
    }

    /// `Activate`: the bus text names a missing version either via an `IsNotExist`-
    /// flavoured message or one that mentions both "not" and "exist".
    pub fn looks_like_non_existent(&self) -> bool {
        if let BusError::Failed(msg) = self {
            let lower = msg.to_lowercase();
            lower.contains("not") && lower.contains("exist")
        } else {
            false
        }
    }

    pub fn detail(&self) -> String {
        match self {
            BusError::Unimplemented(s) | BusError::Failed(s) | BusError::Codec(s) => s.clone(),
        }
    }
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Codec(e.to_string())
    }
}
