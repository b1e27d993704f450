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

//! Until switchd is wired to the real host-side daemon, every bus call reports
//! `Unimplemented` except the checkpoint operations, which are harmless no-ops: there is
//! nothing on this side to checkpoint, so there is nothing to restore either.

use serde_json::Value as Json;

use crate::{BusError, CheckpointOp, HostBus};

pub struct StubHostBus;

fn unimplemented(op: &str) -> BusError {
    BusError::Unimplemented(format!("{op} is not wired to a host-service bus"))
}

#[async_trait::async_trait]
impl HostBus for StubHostBus {
    async fn ssh_checkpoint(&self, _op: CheckpointOp) -> Result<(), BusError> {
        Ok(())
    }

    async fn console_checkpoint(&self, _op: CheckpointOp) -> Result<(), BusError> {
        Ok(())
    }

    async fn glome_restore_checkpoint(&self) -> Result<(), BusError> {
        Ok(())
    }

    async fn glome_config_set(&self, _payload: Json) -> Result<(), BusError> {
        Err(unimplemented("glome_config_set"))
    }

    async fn ssh_mgmt_set(&self, _payload: Json) -> Result<(), BusError> {
        Err(unimplemented("ssh_mgmt_set"))
    }

    async fn console_set(&self, _payload: Json) -> Result<(), BusError> {
        Err(unimplemented("console_set"))
    }

    async fn install_os(&self, _payload: Json) -> Result<Json, BusError> {
        Err(unimplemented("install_os"))
    }

    async fn factory_reset(&self, _payload: Json) -> Result<Json, BusError> {
        Err(unimplemented("factory_reset"))
    }

    async fn activate_image(&self, _version: &str) -> Result<(), BusError> {
        Err(unimplemented("activate_image"))
    }

    async fn list_images(&self) -> Result<Json, BusError> {
        Ok(serde_json::json!({}))
    }

    async fn download_file(&self, _url: &str, _dest: &str) -> Result<(), BusError> {
        Err(unimplemented("download_file"))
    }

    async fn load_docker_image(&self, _path: &str) -> Result<(), BusError> {
        Err(unimplemented("load_docker_image"))
    }

    async fn remove_file(&self, _path: &str) -> Result<(), BusError> {
        Err(unimplemented("remove_file"))
    }
}
