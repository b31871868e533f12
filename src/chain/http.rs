//! HTTP clients for a WhatsOnChain-style node API and a planaria-style
//! metanet index.

use super::{
    ChainClient, ChainIndexClient, FetchedTransaction, IndexedNode, UnspentOutput,
};
use crate::codec::ProtocolType;
use crate::config::ChainSettings;
use crate::error::PipelineError;
use crate::hash::sha256d;
use crate::keys::Address;
use crate::tx::TxOut;
use crate::types::ConfirmedId;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const CHAIN_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CHAIN_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SATS_PER_COIN: f64 = 100_000_000.0;

fn build_chain_http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(CHAIN_HTTP_CONNECT_TIMEOUT)
        .timeout(CHAIN_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::Network(format!("Failed to create HTTP client: {}", e)))
}

async fn read_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, PipelineError> {
    read_json_response(request.send().await?).await
}

/// Node API client
pub struct HttpChainClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChainClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_chain_http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_settings(settings: &ChainSettings) -> Result<Self, PipelineError> {
        Self::new(settings.api_url.clone(), settings.api_key.clone())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("woc-api-key", key),
            None => request,
        }
    }
}

#[derive(Deserialize)]
struct WocTransaction {
    txid: String,
    #[serde(default)]
    vout: Vec<WocOutput>,
    #[serde(default)]
    confirmations: Option<u32>,
}

#[derive(Deserialize)]
struct WocOutput {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: WocScript,
}

#[derive(Deserialize)]
struct WocScript {
    hex: String,
}

#[derive(Deserialize)]
struct WocUnspent {
    tx_hash: String,
    tx_pos: u32,
    value: u64,
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn broadcast(&self, raw_tx: &str) -> Result<ConfirmedId, PipelineError> {
        let bytes = hex::decode(raw_tx)
            .map_err(|e| PipelineError::Format(format!("raw transaction is not hex: {}", e)))?;
        let expected = ConfirmedId::from_digest(sha256d(&bytes));

        let url = format!("{}/tx/raw", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .json(&json!({ "txhex": raw_tx }))
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if !status.is_success() {
            return Err(PipelineError::BroadcastRejected {
                tx_id: expected.to_string(),
                reason: format!("{}: {}", status, body.trim()),
            });
        }

        let returned = body.trim().trim_matches('"');
        match ConfirmedId::parse(returned) {
            Ok(id) if id == expected => Ok(id),
            Ok(id) => {
                warn!(expected = %expected, returned = %id, "Broadcast returned a different id");
                Ok(id)
            }
            Err(_) => Err(PipelineError::BroadcastRejected {
                tx_id: expected.to_string(),
                reason: returned.to_string(),
            }),
        }
    }

    async fn fetch_transaction(
        &self,
        tx_id: &ConfirmedId,
    ) -> Result<Option<FetchedTransaction>, PipelineError> {
        let url = format!("{}/tx/hash/{}", self.base_url, tx_id);
        let response = self.authorized(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let tx: WocTransaction = read_json_response(response).await?;

        let outputs = tx
            .vout
            .into_iter()
            .map(|out| {
                let script = hex::decode(&out.script_pub_key.hex).map_err(|e| {
                    PipelineError::Format(format!("output script is not hex: {}", e))
                })?;
                Ok(TxOut {
                    value: (out.value * SATS_PER_COIN).round() as u64,
                    script,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        Ok(Some(FetchedTransaction {
            tx_id: ConfirmedId::parse(&tx.txid)?,
            outputs,
            confirmations: tx.confirmations,
        }))
    }

    async fn unspent_outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>, PipelineError> {
        let url = format!("{}/address/{}/unspent", self.base_url, address);
        let unspent: Vec<WocUnspent> = read_json(self.authorized(self.client.get(&url))).await?;
        unspent
            .into_iter()
            .map(|u| {
                Ok(UnspentOutput {
                    tx_id: ConfirmedId::parse(&u.tx_hash)?,
                    vout: u.tx_pos,
                    value: u.value,
                })
            })
            .collect()
    }
}

async fn read_json_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PipelineError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(PipelineError::Network(format!(
            "Request failed with status {}: {}",
            status, error_text
        )));
    }
    response
        .json()
        .await
        .map_err(|e| PipelineError::Network(format!("Failed to parse response: {}", e)))
}

/// Metanet graph and mempool queries. Queries are JSON documents sent
/// base64-encoded in the URL path.
pub struct HttpIndexClient {
    client: Client,
    index_url: String,
    bitdb_url: String,
    api_key: Option<String>,
}

impl HttpIndexClient {
    pub fn new(
        index_url: String,
        bitdb_url: String,
        api_key: Option<String>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_chain_http_client()?,
            index_url: index_url.trim_end_matches('/').to_string(),
            bitdb_url: bitdb_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_settings(settings: &ChainSettings) -> Result<Self, PipelineError> {
        Self::new(
            settings.index_url.clone(),
            settings.bitdb_url.clone(),
            settings.api_key.clone(),
        )
    }

    async fn query(&self, base: &str, query: &Value) -> Result<Value, PipelineError> {
        let url = format!("{}/{}", base, encode_query(query));
        debug!(url = %url, "Index query");
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("key", key);
        }
        read_json(request).await
    }

    async fn metanet_nodes(&self, find: Value) -> Result<Vec<IndexedNode>, PipelineError> {
        let query = json!({
            "q": {
                "find": find,
                "project": { "node": 1, "out.s4": 1, "out.s8": 1, "parent": 1 }
            }
        });
        let response = self.query(&self.index_url, &query).await?;
        parse_metanet_nodes(&response)
    }
}

/// Base64 of the compact JSON query
pub fn encode_query(query: &Value) -> String {
    STANDARD.encode(query.to_string())
}

fn parse_metanet_nodes(response: &Value) -> Result<Vec<IndexedNode>, PipelineError> {
    let Some(entries) = response.get("metanet").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    entries
        .iter()
        .map(|entry| {
            let tx = entry
                .pointer("/node/tx")
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::Format("index entry has no node.tx".to_string()))?;
            let address = entry
                .pointer("/node/a")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let protocol = entry
                .pointer("/out/0/s4")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let name = entry
                .pointer("/out/0/s8")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(protocol);
            let parent_tx_id = entry
                .pointer("/parent/tx")
                .and_then(Value::as_str)
                .map(ConfirmedId::parse)
                .transpose()?;

            Ok(IndexedNode {
                tx_id: ConfirmedId::parse(tx)?,
                address: address.to_string(),
                parent_tx_id,
                protocol: ProtocolType::from_field(protocol),
                name: name.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl ChainIndexClient for HttpIndexClient {
    async fn node_by_tx(&self, tx_id: &ConfirmedId) -> Result<Option<IndexedNode>, PipelineError> {
        let nodes = self
            .metanet_nodes(json!({ "node.tx": tx_id.as_str() }))
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn children_by_parent(
        &self,
        tx_id: &ConfirmedId,
    ) -> Result<Vec<IndexedNode>, PipelineError> {
        self.metanet_nodes(json!({ "parent.tx": tx_id.as_str() }))
            .await
    }

    async fn is_visible(&self, tx_id: &ConfirmedId) -> Result<bool, PipelineError> {
        let query = json!({
            "v": 3,
            "q": { "find": { "tx.h": tx_id.as_str() }, "project": { "tx.h": 1 } }
        });
        let response = self.query(&self.bitdb_url, &query).await?;
        let count = |key: &str| response.get(key).and_then(Value::as_array).map_or(0, Vec::len);
        Ok(count("u") + count("c") > 0)
    }

    async fn unconfirmed_outputs(&self, address: &Address) -> Result<usize, PipelineError> {
        let query = json!({
            "v": 3,
            "q": {
                "db": ["u"],
                "find": { "in.e.a": address.to_string() },
                "project": { "tx.h": 1, "out.i": 1 }
            }
        });
        let response = self.query(&self.bitdb_url, &query).await?;
        Ok(response
            .get("u")
            .and_then(Value::as_array)
            .map_or(0, |txs| {
                txs.iter()
                    .map(|tx| tx.get("out").and_then(Value::as_array).map_or(0, Vec::len))
                    .sum()
            }))
    }
}
