//! Exercises the wiring `builder::build` produces end-to-end: each gRPC service talks
//! to the logical DB and the (stub) host bus the way `main` would hand it requests,
//! without going through a live socket.

use switchd::{builder, config::Settings};
use switchd_grpc::{
    gnmi::{self as gnmi_pb, gnmi_server::Gnmi, typed_value, CapabilityRequest, GetRequest, Path, PathElem, SetRequest, TypedValue, Update},
    gnoi_os as os_pb,
    gnoi_system as system_pb,
};
use tonic::Request;

fn test_settings(dir: &std::path::Path) -> Settings {
    Settings {
        listen: "127.0.0.1:0".to_string(),
        image_dir: dir.join("images"),
        crl_dir: dir.join("crl"),
        tls_dir: dir.join("tls"),
        certz_metadata_path: dir.join("certz_meta.json"),
        ssh_metadata_path: dir.join("ssh_meta.json"),
        console_metadata_path: dir.join("console_meta.json"),
        min_sample_interval_ms: 1000,
        report_grpc_error: false,
    }
}

fn prefix(target: &str) -> Path {
    Path { origin: String::new(), elem: vec![], target: target.to_string() }
}

fn keyed_path(table: &str, key_name: &str, key_value: &str) -> Path {
    Path {
        origin: String::new(),
        elem: vec![
            PathElem { name: table.to_string(), key: Default::default() },
            PathElem { name: key_name.to_string(), key: [(key_name.to_string(), key_value.to_string())].into_iter().collect() },
        ],
        target: String::new(),
    }
}

#[tokio::test]
async fn capabilities_reports_json_encodings() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = builder::build(&test_settings(tmp.path()));
    let response = ctx.gnmi.capabilities(Request::new(CapabilityRequest {})).await.unwrap().into_inner();
    assert!(response.supported_encodings.contains(&(gnmi_pb::Encoding::Json as i32)));
}

#[tokio::test]
async fn set_then_get_round_trips_through_the_db() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = builder::build(&test_settings(tmp.path()));

    let update_path = keyed_path("LLDP_ENTRY_TABLE", "name", "eth0");
    let set_req = SetRequest {
        prefix: Some(prefix("APPL_DB")),
        delete: vec![],
        replace: vec![],
        update: vec![Update {
            path: Some(update_path.clone()),
            val: Some(TypedValue { value: Some(typed_value::Value::JsonVal(r#"{"oper_status":"up"}"#.to_string())) }),
            duplicates: 0,
        }],
    };
    ctx.gnmi.set(Request::new(set_req)).await.unwrap();

    let get_req = GetRequest { prefix: Some(prefix("APPL_DB")), path: vec![update_path], r#type: String::new(), encoding: 0 };
    let response = ctx.gnmi.get(Request::new(get_req)).await.unwrap().into_inner();
    assert_eq!(response.notification.len(), 1);
}

#[tokio::test]
async fn get_on_an_absent_key_yields_no_notification() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = builder::build(&test_settings(tmp.path()));

    let get_req = GetRequest {
        prefix: Some(prefix("APPL_DB")),
        path: vec![keyed_path("LLDP_ENTRY_TABLE", "name", "eth99")],
        r#type: String::new(),
        encoding: 0,
    };
    let response = ctx.gnmi.get(Request::new(get_req)).await.unwrap().into_inner();
    assert!(response.notification.is_empty());
}

#[tokio::test]
async fn factory_reset_reports_unsupported_without_a_host_daemon() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = builder::build(&test_settings(tmp.path()));
    use system_pb::system_server::System;

    let response = ctx.system.factory_reset(Request::new(system_pb::FactoryResetRequest { zero_fill: false, factory_os: false })).await.unwrap().into_inner();
    match response.response {
        Some(system_pb::factory_reset_response::Response::ResetError(e)) => {
            assert_eq!(e.r#type, system_pb::FactoryResetErrorType::Unsupported as i32)
        },
        other => panic!("expected ResetError, got {other:?}"),
    }
}

#[tokio::test]
async fn os_verify_and_activate_go_through_the_host_bus() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = builder::build(&test_settings(tmp.path()));
    use os_pb::os_server::Os;

    let verify = ctx.os_install.verify(Request::new(os_pb::VerifyRequest {})).await.unwrap().into_inner();
    assert_eq!(verify.version, "");

    let activate = ctx
        .os_install
        .activate(Request::new(os_pb::ActivateRequest { version: "1.0.0".to_string(), standby_supervisor: 0, no_reboot: false }))
        .await
        .unwrap()
        .into_inner();
    match activate.response {
        Some(os_pb::activate_response::Response::ActivateError(e)) => {
            assert_eq!(e.r#type, os_pb::ActivateErrorType::ActivateFailRetry as i32)
        },
        other => panic!("expected ActivateError, got {other:?}"),
    }
}
