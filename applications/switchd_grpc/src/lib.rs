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

//! Generated protobuf/gRPC bindings for switchd's four service families. Unlike
//! `tari_app_grpc` (which checks its `tonic_build` output into `src/generated/`),
//! switchd relies on `build.rs` generating straight into `OUT_DIR`: hand-reproducing
//! `tonic_build`'s macro expansion would not be genuine generated code (see DESIGN.md).

pub mod gnmi {
    tonic::include_proto!("gnmi");
}

pub mod gnoi_os {
    tonic::include_proto!("gnoi.os");
}

pub mod gnoi_system {
    tonic::include_proto!("gnoi.system");
}

pub mod gnsi_certz {
    tonic::include_proto!("gnsi.certz");
}

pub mod gnsi_credentialz {
    tonic::include_proto!("gnsi.credentialz");
}

pub mod containerz {
    tonic::include_proto!("containerz");
}
