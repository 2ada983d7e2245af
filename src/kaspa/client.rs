//! Kaspa node client over the JSON wRPC WebSocket interface.
//!
//! Frames are `{"id", "method", "params"}` in both directions; a reply carries
//! its payload in `params` (or `result`) and failures in `error`. Each
//! connection runs a session task that owns the socket and serves one call
//! at a time, matching replies to calls by id and skipping notifications.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::client_transport::ws::{Url, WsTransportClientBuilder};
use jsonrpsee::core::client::{ReceivedMessage, TransportReceiverT, TransportSenderT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::types::{
    GetUtxosByAddressesRequest, GetUtxosByAddressesResponse, RpcTransaction,
    RpcUtxosByAddressesEntry, SubmitTransactionRequest, SubmitTransactionResponse,
};

/// Per-call timeout applied by the session.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// WebSocket handshake timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const GET_UTXOS_BY_ADDRESSES: &str = "getUtxosByAddresses";
const SUBMIT_TRANSACTION: &str = "submitTransaction";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to Kaspa RPC {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("failed to encode {method} params: {source}")]
    Params {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Kaspa RPC {method} transport error: {reason}")]
    Transport { method: &'static str, reason: String },
    #[error("Kaspa RPC {method} returned an error: {message}")]
    Rpc { method: &'static str, message: String },
    #[error("failed to decode {method} reply: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Kaspa RPC {method} timed out after {after:?}")]
    Timeout { method: &'static str, after: Duration },
    #[error("Kaspa RPC session closed during {method}")]
    Closed { method: &'static str },
}

/// A live session with a Kaspa node.
#[async_trait]
pub trait LedgerConnection: Send + Sync + 'static {
    /// UTXOs currently spendable by any of `addresses`.
    async fn get_utxos_by_addresses(
        &self,
        addresses: Vec<String>,
    ) -> Result<Vec<RpcUtxosByAddressesEntry>, ClientError>;

    /// Submit a signed transaction and return the id the node assigned.
    async fn submit_transaction(
        &self,
        transaction: RpcTransaction,
        allow_orphan: bool,
    ) -> Result<String, ClientError>;

    /// Whether the session can still be used. Dead sessions are dropped from the pool.
    fn is_connected(&self) -> bool {
        true
    }

    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Opens new ledger sessions for the connection pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: LedgerConnection;

    async fn connect(&self) -> Result<Self::Connection, ClientError>;
}

/// Opens wRPC WebSocket sessions to a Kaspa node.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    request_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    fn connect_error(&self, reason: impl ToString) -> ClientError {
        let reason = reason.to_string();
        error!("Kaspa RPC connect to {} failed: {}", self.url, reason);
        ClientError::Connect {
            url: self.url.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Connection = KaspaClient;

    async fn connect(&self) -> Result<KaspaClient, ClientError> {
        debug!("Opening Kaspa RPC session to {}", self.url);
        let url = Url::parse(&self.url).map_err(|e| self.connect_error(e))?;
        let (sender, receiver) = WsTransportClientBuilder::default()
            .connection_timeout(CONNECT_TIMEOUT)
            .build(url)
            .await
            .map_err(|e| self.connect_error(e))?;
        Ok(KaspaClient::spawn(sender, receiver, self.request_timeout))
    }
}

#[derive(Serialize)]
struct RequestFrame<'a, P> {
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct ResponseFrame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default, alias = "result")]
    params: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Node errors arrive either as `{"message": ...}` or as a bare string.
fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}

struct Call {
    id: u64,
    method: &'static str,
    frame: String,
    reply: oneshot::Sender<Result<Value, ClientError>>,
}

/// Serve calls in order until the handle is dropped or the socket fails.
async fn run_session<S, R>(mut sender: S, mut receiver: R, mut calls: mpsc::Receiver<Call>)
where
    S: TransportSenderT + Send,
    R: TransportReceiverT + Send,
{
    while let Some(call) = calls.recv().await {
        let outcome = exchange(&mut sender, &mut receiver, call.id, call.method, call.frame).await;
        let broken = matches!(outcome, Err(ClientError::Transport { .. }));
        let _ = call.reply.send(outcome);
        if broken {
            break;
        }
    }
    if let Err(e) = sender.close().await {
        debug!("Closing Kaspa RPC socket failed: {}", e);
    }
}

async fn exchange<S, R>(
    sender: &mut S,
    receiver: &mut R,
    id: u64,
    method: &'static str,
    frame: String,
) -> Result<Value, ClientError>
where
    S: TransportSenderT + Send,
    R: TransportReceiverT + Send,
{
    let transport = |e: &dyn std::fmt::Display| ClientError::Transport {
        method,
        reason: e.to_string(),
    };

    sender.send(frame).await.map_err(|e| transport(&e))?;
    loop {
        let text = match receiver.receive().await.map_err(|e| transport(&e))? {
            ReceivedMessage::Text(text) => text,
            ReceivedMessage::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            ReceivedMessage::Pong => continue,
        };
        let reply: ResponseFrame = match serde_json::from_str(&text) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Ignoring undecodable Kaspa RPC frame: {}", e);
                continue;
            }
        };
        if reply.id != Some(id) {
            debug!("Skipping Kaspa RPC frame for id {:?}", reply.id);
            continue;
        }
        if let Some(error) = reply.error {
            return Err(ClientError::Rpc {
                method,
                message: error_message(&error),
            });
        }
        return Ok(reply.params.unwrap_or(Value::Null));
    }
}

/// Handle to one Kaspa RPC session.
pub struct KaspaClient {
    calls: mpsc::Sender<Call>,
    next_id: AtomicU64,
    healthy: AtomicBool,
    request_timeout: Duration,
}

impl KaspaClient {
    fn spawn<S, R>(sender: S, receiver: R, request_timeout: Duration) -> Self
    where
        S: TransportSenderT + Send,
        R: TransportReceiverT + Send,
    {
        let (calls, queue) = mpsc::channel(1);
        tokio::spawn(run_session(sender, receiver, queue));
        Self {
            calls,
            next_id: AtomicU64::new(1),
            healthy: AtomicBool::new(true),
            request_timeout,
        }
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&RequestFrame { id, method, params })
            .map_err(|source| ClientError::Params { method, source })?;

        debug!("Sending Kaspa RPC request: method={}, id={}", method, id);
        let (reply, response) = oneshot::channel();
        let call = Call {
            id,
            method,
            frame,
            reply,
        };
        self.calls
            .send(call)
            .await
            .map_err(|_| ClientError::Closed { method })?;

        let value = match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Closed { method }),
            Err(_) => {
                // the session may still deliver a stale reply; retire it
                self.healthy.store(false, Ordering::Release);
                Err(ClientError::Timeout {
                    method,
                    after: self.request_timeout,
                })
            }
        }
        .inspect_err(|e| error!("Kaspa RPC error: method={}, error={}", method, e))?;

        serde_json::from_value(value).map_err(|source| ClientError::Decode { method, source })
    }
}

#[async_trait]
impl LedgerConnection for KaspaClient {
    async fn get_utxos_by_addresses(
        &self,
        addresses: Vec<String>,
    ) -> Result<Vec<RpcUtxosByAddressesEntry>, ClientError> {
        let response: GetUtxosByAddressesResponse = self
            .call(GET_UTXOS_BY_ADDRESSES, GetUtxosByAddressesRequest { addresses })
            .await?;
        Ok(response.entries)
    }

    async fn submit_transaction(
        &self,
        transaction: RpcTransaction,
        allow_orphan: bool,
    ) -> Result<String, ClientError> {
        let request = SubmitTransactionRequest {
            transaction,
            allow_orphan,
        };
        let response: SubmitTransactionResponse = self.call(SUBMIT_TRANSACTION, request).await?;
        Ok(response.transaction_id)
    }

    fn is_connected(&self) -> bool {
        self.healthy.load(Ordering::Acquire) && !self.calls.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Error)]
    #[error("socket reset")]
    struct SocketReset;

    /// In-memory socket: records sent frames and answers with scripted ones.
    #[derive(Clone, Default)]
    struct Script {
        sent: Arc<Mutex<Vec<Value>>>,
        replies: Arc<Mutex<VecDeque<Option<String>>>>,
        hang: bool,
    }

    impl Script {
        fn reply(self, frame: Value) -> Self {
            self.replies.lock().unwrap().push_back(Some(frame.to_string()));
            self
        }

        fn reset(self) -> Self {
            self.replies.lock().unwrap().push_back(None);
            self
        }

        fn client(&self, timeout: Duration) -> KaspaClient {
            KaspaClient::spawn(self.clone(), self.clone(), timeout)
        }
    }

    #[async_trait]
    impl TransportSenderT for Script {
        type Error = SocketReset;

        async fn send(&mut self, msg: String) -> Result<(), SocketReset> {
            self.sent.lock().unwrap().push(serde_json::from_str(&msg).unwrap());
            Ok(())
        }
    }

    #[async_trait]
    impl TransportReceiverT for Script {
        type Error = SocketReset;

        async fn receive(&mut self) -> Result<ReceivedMessage, SocketReset> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            match self.replies.lock().unwrap().pop_front() {
                Some(Some(text)) => Ok(ReceivedMessage::Text(text)),
                _ => Err(SocketReset),
            }
        }
    }

    fn spk() -> String {
        format!("000020{}ac", "11".repeat(32))
    }

    #[tokio::test]
    async fn test_get_utxos_uses_node_envelope() {
        let script = Script::default()
            .reply(json!({"method": "blockAddedNotification", "params": {}}))
            .reply(json!({
                "id": 1,
                "method": "getUtxosByAddresses",
                "params": {"entries": [{
                    "address": "kaspatest:qq",
                    "outpoint": {"transactionId": "aa".repeat(32), "index": 0},
                    "utxoEntry": {
                        "amount": 150000,
                        "scriptPublicKey": spk(),
                        "blockDaaScore": 9,
                        "isCoinbase": false
                    }
                }]}
            }));
        let client = script.client(REQUEST_TIMEOUT);

        let entries = client
            .get_utxos_by_addresses(vec!["kaspatest:qq".to_string()])
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].utxo_entry.amount, 150_000);
        assert_eq!(entries[0].utxo_entry.script_public_key.script, &spk()[4..]);

        let sent = script.sent.lock().unwrap();
        assert_eq!(
            sent[0],
            json!({
                "id": 1,
                "method": "getUtxosByAddresses",
                "params": {"addresses": ["kaspatest:qq"]}
            })
        );
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_submit_accepts_result_envelope_and_skips_stale_ids() {
        let script = Script::default()
            .reply(json!({"id": 99, "params": {"transactionId": "stale"}}))
            .reply(json!({"jsonrpc": "2.0", "id": 1, "result": {"transactionId": "ab".repeat(32)}}));
        let client = script.client(REQUEST_TIMEOUT);

        let tx = RpcTransaction {
            version: 0,
            inputs: vec![],
            outputs: vec![],
            lock_time: 0,
            subnetwork_id: "00".repeat(20),
            gas: 0,
            payload: String::new(),
            mass: 0,
        };
        let id = client.submit_transaction(tx, false).await.unwrap();
        assert_eq!(id, "ab".repeat(32));

        let sent = script.sent.lock().unwrap();
        assert_eq!(sent[0]["method"], "submitTransaction");
        assert_eq!(sent[0]["params"]["allowOrphan"], false);
        assert_eq!(sent[0]["params"]["transaction"]["subnetworkId"], "00".repeat(20));
    }

    #[tokio::test]
    async fn test_node_error_is_reported() {
        let script = Script::default()
            .reply(json!({"id": 1, "error": {"message": "transaction already in mempool"}}))
            .reply(json!({"id": 2, "error": "orphan"}));
        let client = script.client(REQUEST_TIMEOUT);

        let err = client.get_utxos_by_addresses(vec![]).await.unwrap_err();
        assert!(
            matches!(err, ClientError::Rpc { ref message, .. } if message == "transaction already in mempool")
        );
        let err = client.get_utxos_by_addresses(vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Rpc { ref message, .. } if message == "orphan"));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_socket_failure_ends_session() {
        let client = Script::default().reset().client(REQUEST_TIMEOUT);

        let err = client.get_utxos_by_addresses(vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));

        // the session task exits after a transport failure
        tokio::time::timeout(Duration::from_secs(1), async {
            while client.is_connected() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            client.get_utxos_by_addresses(vec![]).await,
            Err(ClientError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_retires_session() {
        let script = Script {
            hang: true,
            ..Script::default()
        };
        let client = script.client(Duration::from_millis(50));

        let err = client.get_utxos_by_addresses(vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!({"code": -1, "message": "bad"})), "bad");
        assert_eq!(error_message(&json!("plain")), "plain");
        assert_eq!(error_message(&json!({"code": 7})), r#"{"code":7}"#);
    }
}
