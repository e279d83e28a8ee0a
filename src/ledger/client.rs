//! Ledger RPC client.
//!
//! A single shared `reqwest::Client` POSTs `{"method", "params"}` bodies:
//! `.post(url).json(&body).send().await?.error_for_status()?.json().await?`.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{IndexerError, Result};

use super::wire::{AccountOffersResponse, AccountTxEntry, AccountTxResponse, TxResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

pub struct LedgerClient {
    http: reqwest::Client,
    rpc_url: String,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    params: [Value; 1],
}

impl LedgerClient {
    pub fn new(rpc_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;
        Ok(Self { http, rpc_url: rpc_url.into() })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = RpcRequest { method, params: [params] };
        retry(MAX_RETRIES, || async {
            let response = self
                .http
                .post(&self.rpc_url)
                .json(&body)
                .send()
                .await
                .map_err(|e| IndexerError::Rpc(e.to_string()))?
                .error_for_status()
                .map_err(|e| IndexerError::Rpc(e.to_string()))?;
            let envelope: Value = response.json().await.map_err(|e| IndexerError::Rpc(e.to_string()))?;
            envelope
                .get("result")
                .cloned()
                .ok_or_else(|| IndexerError::Rpc(format!("{method}: response has no `result`")))
        })
        .await
    }

    /// `account_tx(account, ledger_index_min, forward=true, limit)`.
    pub async fn account_tx(
        &self,
        account: &str,
        ledger_index_min: u32,
        limit: u32,
        marker: Option<&Value>,
    ) -> Result<AccountTxResponse> {
        let mut params = serde_json::json!({
            "account": account,
            "ledger_index_min": ledger_index_min,
            "forward": true,
            "limit": limit,
        });
        if let Some(marker) = marker {
            params["marker"] = marker.clone();
        }
        let result = self.call("account_tx", params).await?;
        serde_json::from_value(result).map_err(|e| IndexerError::Rpc(e.to_string()))
    }

    /// `account_offers(account)`.
    pub async fn account_offers(&self, account: &str) -> Result<AccountOffersResponse> {
        let params = serde_json::json!({ "account": account });
        let result = self.call("account_offers", params).await?;
        serde_json::from_value(result).map_err(|e| IndexerError::Rpc(e.to_string()))
    }

    /// `tx(hash)` — used only by the reconciler for audit.
    pub async fn tx(&self, hash: &str) -> Result<Option<crate::model::transaction::RawTransaction>> {
        let params = serde_json::json!({ "transaction": hash });
        let result = self.call("tx", params).await?;
        let response: TxResponse = serde_json::from_value(result).map_err(|e| IndexerError::Rpc(e.to_string()))?;
        Ok(response.into_raw())
    }
}

/// Pull every page of `account_tx` for `account` starting at
/// `ledger_index_min`, until a page has fewer than two transactions or
/// carries no `marker`.
pub async fn paginate_account_tx(
    client: &LedgerClient,
    account: &str,
    ledger_index_min: u32,
    page_limit: u32,
) -> Result<Vec<crate::model::transaction::RawTransaction>> {
    let mut out = Vec::new();
    let mut marker: Option<Value> = None;

    loop {
        let page = client
            .account_tx(account, ledger_index_min, page_limit, marker.as_ref())
            .await?;

        let count = page.transactions.len();
        for entry in page.transactions {
            if let Some(raw) = entry_into_raw(entry) {
                out.push(raw);
            }
        }

        if page.marker.is_none() || count < 2 {
            break;
        }
        marker = page.marker;
    }

    Ok(out)
}

fn entry_into_raw(entry: AccountTxEntry) -> Option<crate::model::transaction::RawTransaction> {
    entry.into_raw()
}

/// Exponential backoff retry: `1000 * 2^attempt` ms between attempts.
pub async fn retry<T, F, Fut>(max_retries: u32, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries => {
                let backoff_ms = 1000u64 * 2u64.pow(attempt);
                warn!(attempt, backoff_ms, error = %err, "retrying after transient failure");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
