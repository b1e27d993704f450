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

//! Per-RPC authenticator. The concrete credential check (peer certificate inspection,
//! RBAC policy lookup) is an external collaborator; this module only specifies the shape
//! every gRPC handler calls through.

use tonic::{Request, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTag {
    Gnmi,
    GnoiOs,
    GnoiSystem,
    Certz,
    Credentialz,
    Containerz,
}

/// The enriched context handed back on success: today just the service tag and
/// write-access flag the caller already knows, reserved for the identity the real
/// authenticator would attach (peer common name, RBAC role).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub service: ServiceTag,
    pub write_access: bool,
}

pub trait Authenticator: Send + Sync {
    fn authenticate<T>(
        &self,
        request: &Request<T>,
        service: ServiceTag,
        write_access: bool,
    ) -> Result<AuthContext, Status>;
}

/// Default authenticator: every mutually-TLS-authenticated peer that reached the
/// handler is accepted. A production deployment swaps this for one that inspects peer
/// certificates against an RBAC policy; the boundary is this trait.
pub struct AllowAllAuthenticator;

impl Authenticator for AllowAllAuthenticator {
    fn authenticate<T>(
        &self,
        _request: &Request<T>,
        service: ServiceTag,
        write_access: bool,
    ) -> Result<AuthContext, Status> {
        Ok(AuthContext { service, write_access })
    }
}
