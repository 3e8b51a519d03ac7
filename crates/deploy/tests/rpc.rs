//! [`JsonRpcClient`] against a scripted local JSON-RPC endpoint.

mod common;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_core::primitives::{Bytes, TxHash, address};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use townhall_deploy::{ChainClient, ClientError, DeploymentRequest, JsonRpcClient, JsonRpcConfig};
use url::Url;

use common::{SENDER, init_tracing};

const BAD_GATEWAY: &str = "<html><body><h1>502 Bad Gateway</h1></body></html>";

/// Canned HTTP reply: status and body.
type Reply = (u16, String);

fn result(value: serde_json::Value) -> Reply {
    (
        200,
        serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": value }).to_string(),
    )
}

fn rpc_error(message: &str) -> Reply {
    (
        200,
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": message }
        })
        .to_string(),
    )
}

fn bad_gateway() -> Reply {
    (502, BAD_GATEWAY.to_string())
}

/// A node that answers each request with the next scripted reply, repeating
/// the last one once the script runs out.
struct ScriptedNode {
    url: Url,
    requests: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl ScriptedNode {
    async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));

        let (counter, seen) = (requests.clone(), bodies.clone());
        tokio::spawn(async move {
            let mut replies = replies.into_iter();
            let mut last: Option<Reply> = None;

            while let Ok((mut socket, _)) = listener.accept().await {
                let body = read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(body);

                let reply = replies.next().or_else(|| last.clone());
                let Some((status, body)) = reply.clone() else {
                    break;
                };
                last = reply;

                let (reason, content_type) = match status {
                    200 => ("OK", "application/json"),
                    _ => ("Bad Gateway", "text/html"),
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            url,
            requests,
            bodies,
        }
    }

    fn client(&self, receipt_timeout: Duration) -> JsonRpcClient {
        JsonRpcClient::new(JsonRpcConfig {
            receipt_timeout,
            poll_interval: Duration::from_millis(10),
            ..JsonRpcConfig::new(self.url.clone(), SENDER)
        })
        .unwrap()
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Read one HTTP request and return its body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).into_owned();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    line.to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return text[end + 4..].to_string();
            }
        }
    }
}

fn receipt_json(tx_hash: TxHash) -> serde_json::Value {
    serde_json::json!({
        "transactionHash": tx_hash,
        "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
        "status": "0x1",
        "blockNumber": "0x2a"
    })
}

#[tokio::test]
async fn test_receipt_poll_survives_transient_errors() {
    init_tracing();
    let tx_hash = TxHash::repeat_byte(0x11);
    let node = ScriptedNode::start(vec![
        bad_gateway(),
        result(serde_json::Value::Null),
        result(receipt_json(tx_hash)),
    ])
    .await;

    let receipt = node
        .client(Duration::from_secs(5))
        .wait_for_receipt(tx_hash)
        .await
        .expect("receipt after a bad gateway and a pending poll");

    assert!(receipt.success);
    assert_eq!(receipt.tx_hash, tx_hash);
    assert_eq!(
        receipt.contract_address,
        Some(address!("5fbdb2315678afecb367f032d93f642f64180aa3"))
    );
    assert_eq!(receipt.block_number, Some(42));
    assert_eq!(node.requests(), 3);
}

#[tokio::test]
async fn test_receipt_poll_times_out() {
    init_tracing();
    let tx_hash = TxHash::repeat_byte(0x22);
    let node = ScriptedNode::start(vec![result(serde_json::Value::Null)]).await;

    let err = node
        .client(Duration::from_millis(50))
        .wait_for_receipt(tx_hash)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Timeout(hash) if hash == tx_hash));
    assert!(node.requests() > 1);
}

#[tokio::test]
async fn test_send_is_not_retried() {
    init_tracing();
    let node = ScriptedNode::start(vec![bad_gateway(), result(serde_json::json!(TxHash::ZERO))])
        .await;

    let err = node
        .client(Duration::from_secs(1))
        .send_deployment(DeploymentRequest {
            artifact: "Building".to_string(),
            init_code: Bytes::from(vec![0x60, 0x02]),
            nonce: 7,
            gas_price: 1_000_000_000,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Rpc(_)));
    assert_eq!(node.requests(), 1);

    let body: serde_json::Value = serde_json::from_str(&node.bodies()[0]).unwrap();
    assert_eq!(body["method"], "eth_sendTransaction");
    assert_eq!(body["params"][0]["nonce"], "0x7");
    assert_eq!(body["params"][0]["gasPrice"], "0x3b9aca00");
}

#[tokio::test]
async fn test_send_nonce_rejection_is_classified() {
    init_tracing();
    let node =
        ScriptedNode::start(vec![rpc_error("nonce too low: next nonce 8, tx nonce 7")]).await;

    let err = node
        .client(Duration::from_secs(1))
        .send_deployment(DeploymentRequest {
            artifact: "Building".to_string(),
            init_code: Bytes::from(vec![0x60, 0x02]),
            nonce: 7,
            gas_price: 1,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::NonceConflict(_)));
}

#[tokio::test]
async fn test_reads_retry_and_decode_quantities() {
    init_tracing();
    let node = ScriptedNode::start(vec![bad_gateway(), result(serde_json::json!("0x5"))]).await;
    let client = node.client(Duration::from_secs(1));

    assert_eq!(client.transaction_count(SENDER).await.unwrap(), 5);
    assert_eq!(node.requests(), 2);

    let body: serde_json::Value = serde_json::from_str(&node.bodies()[1]).unwrap();
    assert_eq!(body["method"], "eth_getTransactionCount");
    assert_eq!(body["params"][1], "pending");
}
