//! JSON-RPC client for an Ethereum-compatible chain node.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail};
use evlog::meta;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::runtime::get_logger;

/// Wei per ether.
const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

static VALIDATE_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new("^0x[0-9a-fA-F]{40}$").unwrap());

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct ChainClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        Ok(Self::with_client(endpoint, reqwest::Client::builder().build()?))
    }

    pub fn with_client(endpoint: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: endpoint.to_owned(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> anyhow::Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let r: RpcResponse<T> = self.http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (r.result, r.error) {
            (_, Some(e)) => bail!("{} failed: {} (code {})", method, e.message, e.code),
            (Some(v), None) => Ok(v),
            (None, None) => bail!("{} returned no result", method),
        }
    }

    /// Reports whether the node answers at all; transport failures read as "not connected".
    pub async fn is_connected(&self) -> bool {
        match self.call::<bool>("net_listening", json!([])).await {
            Ok(v) => v,
            Err(e) => {
                get_logger().debug("Chain node did not answer connectivity probe.", meta! {
                    "Endpoint" => self.endpoint,
                    "Error" => e,
                });
                false
            }
        }
    }

    pub async fn block_number(&self) -> anyhow::Result<u64> {
        let r: String = self.call("eth_blockNumber", json!([])).await?;
        let n = parse_quantity(&r)?;

        u64::try_from(n).map_err(|_| anyhow!("block number {} out of range", r))
    }

    pub async fn balance_wei(&self, address: &str) -> anyhow::Result<u128> {
        let r: String = self.call("eth_getBalance", json!([address, "latest"])).await?;

        parse_quantity(&r)
    }
}

pub fn is_valid_address(address: &str) -> bool {
    VALIDATE_ADDRESS.is_match(address)
}

/// Parses a hex-encoded JSON-RPC quantity such as `0x1b4`.
pub fn parse_quantity(raw: &str) -> anyhow::Result<u128> {
    let digits = raw.strip_prefix("0x")
        .ok_or_else(|| anyhow!("quantity '{}' is missing its 0x prefix", raw))?;

    if digits.is_empty() {
        bail!("quantity '{}' has no digits", raw);
    }

    u128::from_str_radix(digits, 16).map_err(|e| anyhow!("invalid quantity '{}': {}", raw, e))
}

/// Exact decimal rendering of a wei amount in ether.
pub fn wei_to_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;

    if frac == 0 {
        return whole.to_string();
    }

    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
