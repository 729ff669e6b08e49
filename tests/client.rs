mod utils;

use aria2_bridge::client::{Aria2, Aria2Error};
use aria2_bridge::entities::{DownloadKey, DownloadOptions, DownloadStatus, RpcCall, RpcFault};
use serde_json::json;
use utils::{json_response, rpc_mock, rpc_params};
use wiremock::{MockServer, ResponseTemplate};

// Helper function to create a client with a mock server
async fn setup_client(secret: Option<&str>) -> (MockServer, Aria2) {
    let server = MockServer::start().await;
    let url = format!("{}/jsonrpc", server.uri());

    let aria2 = Aria2::new(url, secret.map(str::to_string), 3000).unwrap();

    (server, aria2)
}

fn rpc_error(error: &anyhow::Error) -> Option<&Aria2Error> {
    error.downcast_ref::<Aria2Error>()
}

#[tokio::test]
async fn test_get_global_stat_sends_token() {
    let (server, aria2) = setup_client(Some("s3cret")).await;

    rpc_mock("aria2.getGlobalStat")
        .and(rpc_params(json!(["token:s3cret"])))
        .respond_with(json_response("test-files/global_stat.json"))
        .expect(1)
        .mount(&server)
        .await;

    let stat = aria2.get_global_stat().await.unwrap();

    server.verify().await;

    assert_eq!(stat.download_speed, 1_234_567);
    assert_eq!(stat.upload_speed, 45_678);
    assert_eq!(stat.num_active, 1);
    assert_eq!(stat.num_waiting, 2);
    assert_eq!(stat.num_stopped, 3);
    assert_eq!(stat.num_stopped_total, 12);
}

#[tokio::test]
async fn test_get_version() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("aria2.getVersion")
        .and(rpc_params(json!([])))
        .respond_with(json_response("test-files/version.json"))
        .mount(&server)
        .await;

    let version = aria2.get_version().await.unwrap();
    assert_eq!(version.version, "1.37.0");
    assert!(version.enabled_features.contains(&"BitTorrent".to_string()));
}

#[tokio::test]
async fn test_add_uri() {
    let (server, aria2) = setup_client(Some("s3cret")).await;

    rpc_mock("aria2.addUri")
        .and(rpc_params(json!([
            "token:s3cret",
            ["https://example.com/test.iso"],
            {"dir": "/downloads"}
        ])))
        .respond_with(json_response("test-files/add_uri.json"))
        .expect(1)
        .mount(&server)
        .await;

    let options = DownloadOptions {
        dir: Some("/downloads".into()),
        ..Default::default()
    };
    let gid = aria2
        .add_uri(&["https://example.com/test.iso".to_string()], &options)
        .await
        .unwrap();

    server.verify().await;
    assert_eq!(gid, "2089b05ecca3d829");
}

#[tokio::test]
async fn test_add_uri_rejects_unsupported_scheme() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("aria2.addUri")
        .respond_with(json_response("test-files/add_uri.json"))
        .expect(0)
        .mount(&server)
        .await;

    let options = DownloadOptions::default();
    let error = aria2
        .add_uri(&["file:///etc/passwd".to_string()], &options)
        .await
        .unwrap_err();
    assert!(matches!(rpc_error(&error), Some(Aria2Error::InvalidInput(_))));

    assert!(aria2.add_uri(&[], &options).await.is_err());
    assert!(aria2.add_uri(&[String::new()], &options).await.is_err());

    server.verify().await;
}

#[tokio::test]
async fn test_tell_waiting() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("aria2.tellWaiting")
        .and(rpc_params(json!([0, 1000, ["gid", "status"]])))
        .respond_with(json_response("test-files/tell_waiting.json"))
        .mount(&server)
        .await;

    let downloads = aria2
        .tell_waiting(0, 1000, &[DownloadKey::Gid, DownloadKey::Status])
        .await
        .unwrap();

    assert_eq!(downloads.len(), 2);
    assert_eq!(downloads[0].gid, "d270c8a44a2fbc90");
    assert_eq!(downloads[0].status, Some(DownloadStatus::Waiting));
    assert_eq!(downloads[1].status, Some(DownloadStatus::Paused));
}

#[tokio::test]
async fn test_tell_status() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("aria2.tellStatus")
        .and(rpc_params(json!(["2089b05ecca3d829", []])))
        .respond_with(json_response("test-files/tell_status.json"))
        .mount(&server)
        .await;

    let download = aria2.tell_status("2089b05ecca3d829", &[]).await.unwrap();

    assert_eq!(download.name(), "ubuntu-24.04-live-server-amd64.iso");
    assert_eq!(download.total_length, 34_896_138);
    assert_eq!(download.files.len(), 1);
    assert_eq!(download.files[0].uris[0].status, "used");
    assert_eq!(download.calculate_speed(), "(98.77 KB/s)");

    assert!(aria2.tell_status("", &[]).await.is_err());
}

#[tokio::test]
async fn test_unauthorized() {
    let (server, aria2) = setup_client(Some("wrong")).await;

    // aria2 answers faults with 400 and a JSON-RPC error body
    rpc_mock("aria2.getGlobalOption")
        .respond_with(
            ResponseTemplate::new(400)
                .append_header("content-type", "application/json")
                .set_body_string(utils::body_from_file("test-files/unauthorized.json")),
        )
        .mount(&server)
        .await;

    let error = aria2.get_global_option().await.unwrap_err();
    match rpc_error(&error) {
        Some(Aria2Error::Rpc { code, message }) => {
            assert_eq!(*code, 1);
            assert_eq!(message, "Unauthorized");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_without_rpc_body() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("aria2.pause")
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let error = aria2.pause("2089b05ecca3d829").await.unwrap_err();
    assert!(matches!(rpc_error(&error), Some(Aria2Error::Http(502))));
}

#[tokio::test]
async fn test_missing_result_is_invalid() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("aria2.unpause")
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"1","jsonrpc":"2.0"}"#))
        .mount(&server)
        .await;

    let error = aria2.unpause("2089b05ecca3d829").await.unwrap_err();
    assert!(matches!(
        rpc_error(&error),
        Some(Aria2Error::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_multicall() {
    let (server, aria2) = setup_client(Some("s3cret")).await;

    rpc_mock("system.multicall")
        .and(rpc_params(json!([[
            {"methodName": "aria2.remove", "params": ["token:s3cret", "2089b05ecca3d829"]},
            {"methodName": "aria2.remove", "params": ["token:s3cret", "ffffffffffffffff"]},
        ]])))
        .respond_with(json_response("test-files/multicall_fault.json"))
        .expect(1)
        .mount(&server)
        .await;

    let results = aria2
        .multicall(&[
            RpcCall::remove("2089b05ecca3d829"),
            RpcCall::remove("ffffffffffffffff"),
        ])
        .await
        .unwrap();

    server.verify().await;

    assert_eq!(results[0], Ok(json!("2089b05ecca3d829")));
    assert_eq!(
        results[1],
        Err(RpcFault {
            code: 1,
            message: "GID ffffffffffffffff is not found".into()
        })
    );
}

#[tokio::test]
async fn test_multicall_result_count_mismatch() {
    let (server, aria2) = setup_client(None).await;

    rpc_mock("system.multicall")
        .respond_with(json_response("test-files/multicall_fault.json"))
        .mount(&server)
        .await;

    let result = aria2.multicall(&[RpcCall::get_global_stat()]).await;
    assert!(result.is_err());
}
