//! JSON-RPC contract reads against a mock node.

use std::sync::Arc;
use std::time::Duration;

use personal_server_chain::abi::encode;
use personal_server_chain::{
    AbiValue, ChainConfig, ChainError, ChainReader, JsonRpcChainClient,
};
use personal_server_core::{Address, ErrorKind};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reader(server: &MockServer) -> ChainReader {
    let config = ChainConfig::moksha()
        .with_rpc_url(server.uri())
        .with_timeout(Duration::from_millis(500));
    let client = JsonRpcChainClient::new(config.rpc_url.clone(), config.request_timeout).unwrap();
    ChainReader::from_config(Arc::new(client), &config)
}

fn rpc_result(data: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": format!("0x{}", hex::encode(data)),
    }))
}

#[tokio::test]
async fn test_permission_read_sends_eth_call_to_permissions_contract() {
    let server = MockServer::start().await;
    let grantor = Address::from_bytes([0xd8; 20]);
    let wire = encode(&[AbiValue::Tuple(vec![
        AbiValue::Uint(8),
        AbiValue::Address(grantor),
        AbiValue::Uint(0),
        AbiValue::String("ipfs://bafkgrant".into()),
        AbiValue::Bytes(vec![]),
        AbiValue::Bool(true),
        AbiValue::Array(vec![AbiValue::Uint(1654817)]),
    ])]);

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_call",
            "params": [{ "to": "0x31fb1d48f6b2265a4cad516bc39e96a18fb7c8de" }, "latest"],
        })))
        .respond_with(rpc_result(&wire))
        .expect(1)
        .mount(&server)
        .await;

    let record = reader(&server).permission(8).await.unwrap();
    assert_eq!(record.id, 8);
    assert_eq!(record.grantor, grantor);
    assert!(record.file_ids.contains(&1654817));
}

#[tokio::test]
async fn test_file_key_read() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "params": [{ "to": "0x8c8788f98385f6ba1add4234e551abba0f82cb7c" }, "latest"],
        })))
        .respond_with(rpc_result(&encode(&[AbiValue::String("0xabcdef".into())])))
        .mount(&server)
        .await;

    let key = reader(&server)
        .file_key(1654817, &Address::from_bytes([1; 20]))
        .await
        .unwrap();
    assert_eq!(key, "0xabcdef");
}

#[tokio::test]
async fn test_rpc_error_is_reverted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": 3, "message": "execution reverted" },
        })))
        .mount(&server)
        .await;

    let err = reader(&server).permission(999).await.unwrap_err();
    assert!(matches!(err, ChainError::Reverted(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_empty_return_data_is_reverted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(&[]))
        .mount(&server)
        .await;

    let err = reader(&server).file(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(&[0u8; 32]).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = reader(&server).file(1).await.unwrap_err();
    assert!(matches!(err, ChainError::Transport(_)));
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_malformed_return_data_is_decode_error() {
    let server = MockServer::start().await;
    // One word where a tuple with a dynamic member is expected.
    Mock::given(method("POST"))
        .respond_with(rpc_result(&[0u8; 32]))
        .mount(&server)
        .await;

    let err = reader(&server).file(1).await.unwrap_err();
    assert!(matches!(err, ChainError::Decode(_)));
}
