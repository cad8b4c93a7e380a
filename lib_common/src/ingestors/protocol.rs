//! # Exchange JSON-RPC Protocol
//!
//! Wire types for the HitBTC v2 WebSocket API: outbound commands, correlated
//! responses for `getSymbol` / `getCurrency`, and the `ticker` notifications
//! pushed after `subscribeTicker`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::store::Quote;

pub const METHOD_GET_SYMBOL: &str = "getSymbol";
pub const METHOD_GET_CURRENCY: &str = "getCurrency";
pub const METHOD_SUBSCRIBE_TICKER: &str = "subscribeTicker";

/// Outbound command envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P: Serialize> {
    pub method: &'a str,
    pub params: P,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct SymbolParams<'a> {
    pub symbol: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CurrencyParams<'a> {
    pub currency: &'a str,
}

/// Error object returned by the exchange in place of `result`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response envelope for a correlated command.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<R> {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default = "Option::default")]
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
    #[serde(default)]
    pub id: Option<u64>,
}

/// `getSymbol` result. Only `baseCurrency` and `feeCurrency` feed the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub id: String,
    pub base_currency: String,
    #[serde(default)]
    pub quote_currency: String,
    #[serde(default)]
    pub quantity_increment: String,
    #[serde(default)]
    pub tick_size: String,
    #[serde(default)]
    pub take_liquidity_rate: String,
    #[serde(default)]
    pub provide_liquidity_rate: String,
    pub fee_currency: String,
}

/// `getCurrency` result. Only `fullName` feeds the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyInfo {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub crypto: bool,
    #[serde(default)]
    pub payin_enabled: bool,
    #[serde(default)]
    pub payout_enabled: bool,
    #[serde(default)]
    pub transfer_enabled: bool,
    #[serde(default)]
    pub delisted: bool,
    #[serde(default)]
    pub payout_fee: Option<String>,
}

/// Payload of a `ticker` notification.
///
/// The exchange sends `null` for sides with an empty book; those decode to
/// empty strings so the record keeps its all-strings shape.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TickerParams {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ask: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bid: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub open: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub low: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub high: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub volume: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub volume_quote: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub symbol: String,
}

impl TickerParams {
    pub fn into_quote(self) -> Quote {
        Quote {
            ask: self.ask,
            bid: self.bid,
            last: self.last,
            open: self.open,
            low: self.low,
            high: self.high,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Classified streaming frame.
#[derive(Debug)]
pub enum Inbound {
    /// `ticker` / `snapshotTicker` notification.
    Ticker(TickerParams),
    /// Reply to a command, e.g. the `true` ack of `subscribeTicker`.
    Response {
        id: Option<u64>,
        error: Option<RpcErrorBody>,
    },
    /// Notification with a method this service does not consume.
    Other(String),
}

#[derive(Deserialize)]
struct RawInbound {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Decodes one streaming frame. Any JSON or shape error is returned as-is.
pub fn decode_inbound(text: &str) -> Result<Inbound, serde_json::Error> {
    let raw: RawInbound = serde_json::from_str(text)?;
    match raw.method.as_deref() {
        Some("ticker") | Some("snapshotTicker") => {
            let params = raw
                .params
                .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("params"))?;
            Ok(Inbound::Ticker(serde_json::from_value(params)?))
        }
        Some(other) => Ok(Inbound::Other(other.to_string())),
        None => Ok(Inbound::Response {
            id: raw.id,
            error: raw.error,
        }),
    }
}
