//! Test fixtures shared by the integration tests: a local websocket server
//! that speaks the exchange's JSON-RPC dialect.

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

/// How the mock exchange behaves once every subscription is acknowledged.
#[derive(Clone, Copy)]
pub enum AfterPush {
    /// Keep the connection open until the client goes away.
    Hold,
    /// Close the connection.
    Close,
}

fn symbol_result(symbol: &str) -> Value {
    match symbol {
        "ETHBTC" => json!({
            "id": "ETHBTC", "baseCurrency": "ETH", "quoteCurrency": "BTC",
            "quantityIncrement": "0.001", "tickSize": "0.000001",
            "takeLiquidityRate": "0.001", "provideLiquidityRate": "-0.0001",
            "feeCurrency": "BTC"
        }),
        "BTCUSD" => json!({
            "id": "BTCUSD", "baseCurrency": "BTC", "quoteCurrency": "USD",
            "feeCurrency": "USD"
        }),
        _ => Value::Null,
    }
}

fn currency_result(currency: &str) -> Value {
    match currency {
        "ETH" => json!({"id": "ETH", "fullName": "Ethereum", "crypto": true}),
        "BTC" => json!({"id": "BTC", "fullName": "Bitcoin", "crypto": true}),
        _ => Value::Null,
    }
}

pub fn stream_frames() -> Vec<String> {
    vec![
        json!({"jsonrpc": "2.0", "method": "ticker", "params": {
            "ask": "0.054464", "bid": "0.054463", "last": "0.054463",
            "open": "0.057133", "low": "0.053615", "high": "0.057559",
            "volume": "33068.346", "volumeQuote": "1832.687530809",
            "timestamp": "2017-10-19T15:45:44.941Z", "symbol": "ETHBTC"
        }})
        .to_string(),
        "{\"method\":\"ticker\",\"params\":".to_string(),
        json!({"jsonrpc": "2.0", "method": "ticker", "params": {
            "ask": "1", "bid": "1", "last": "1", "open": "1", "low": "1", "high": "1",
            "symbol": "LTCBTC"
        }})
        .to_string(),
        json!({"jsonrpc": "2.0", "method": "ticker", "params": {
            "ask": "9000.01", "bid": null, "last": "8999.5",
            "open": "8800", "low": "8700", "high": "9100",
            "timestamp": "2017-10-19T15:45:45.000Z", "symbol": "BTCUSD"
        }})
        .to_string(),
    ]
}

/// Starts a one-connection mock exchange. Returns its `ws://` URL.
pub async fn spawn_exchange(symbols: usize, after_push: AfterPush, reject_symbol: bool) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);

    tokio::spawn(async move {
        let Ok((tcp, _)) = listener.accept().await else { return };
        let Ok(mut ws) = accept_async(tcp).await else { return };
        let mut subscribed = 0;

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else { continue };
            let Ok(req) = serde_json::from_str::<Value>(&text) else { continue };
            let id = req["id"].clone();
            let reply = match req["method"].as_str() {
                Some("getSymbol") if reject_symbol => json!({
                    "jsonrpc": "2.0",
                    "error": {"code": 2001, "message": "Symbol not found", "description": "Try get /api/2/public/symbol"},
                    "id": id
                }),
                Some("getSymbol") => json!({
                    "jsonrpc": "2.0",
                    "result": symbol_result(req["params"]["symbol"].as_str().unwrap_or_default()),
                    "id": id
                }),
                Some("getCurrency") => json!({
                    "jsonrpc": "2.0",
                    "result": currency_result(req["params"]["currency"].as_str().unwrap_or_default()),
                    "id": id
                }),
                Some("subscribeTicker") => {
                    subscribed += 1;
                    json!({"jsonrpc": "2.0", "result": true, "id": id})
                }
                _ => continue,
            };
            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                return;
            }

            if subscribed == symbols {
                subscribed = 0;
                for frame in stream_frames() {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                if let AfterPush::Close = after_push {
                    let _ = ws.close(None).await;
                    return;
                }
            }
        }
    });

    Ok(url)
}
