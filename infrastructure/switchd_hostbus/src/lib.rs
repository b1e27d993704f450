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

//! Client contract for the host-side control-plane message bus. The bus itself (its
//! transport and the privileged daemon on the other end) is an external collaborator;
//! this crate only names and type-checks its surface.

pub mod error;
pub mod stub;

pub use error::BusError;
use serde_json::Value as Json;
pub use stub::StubHostBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOp {
    Create,
    Restore,
    Delete,
}

/// The host-service bus contract. Every method is a suspension point and carries no
/// implicit retry.
#[async_trait::async_trait]
pub trait HostBus: Send + Sync {
    async fn ssh_checkpoint(&self, op: CheckpointOp) -> Result<(), BusError>;
    async fn console_checkpoint(&self, op: CheckpointOp) -> Result<(), BusError>;
    async fn glome_restore_checkpoint(&self) -> Result<(), BusError>;
    async fn glome_config_set(&self, payload: Json) -> Result<(), BusError>;
    async fn ssh_mgmt_set(&self, payload: Json) -> Result<(), BusError>;
    async fn console_set(&self, payload: Json) -> Result<(), BusError>;
    async fn install_os(&self, payload: Json) -> Result<Json, BusError>;
    async fn factory_reset(&self, payload: Json) -> Result<Json, BusError>;
    async fn activate_image(&self, version: &str) -> Result<(), BusError>;
    async fn list_images(&self) -> Result<Json, BusError>;
    async fn download_file(&self, url: &str, dest: &str) -> Result<(), BusError>;
    async fn load_docker_image(&self, path: &str) -> Result<(), BusError>;
    async fn remove_file(&self, path: &str) -> Result<(), BusError>;
}
