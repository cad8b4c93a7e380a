//! # HitBTC WSS Ingestor
//!
//! Resolves the static fields of every registered symbol, subscribes to their
//! tickers and then feeds every ticker notification into the shared
//! [`TickerContext`].
//!
//! ## Ordering precondition
//!
//! `getSymbol` / `getCurrency` are answered by blocking on the next inbound
//! frame. That is only sound because initialization runs to completion before
//! the first `subscribeTicker` is sent, so no ticker notification can arrive in
//! between. Request ids are still checked against the response id. Keep this
//! order, or route responses by id, if the two phases ever need to interleave.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::context::TickerContext;
use crate::core::health::FeedState;
use crate::core::registry::Slot;
use crate::core::store::StaticFields;
use crate::ingestors::protocol::{
    decode_inbound, CurrencyInfo, CurrencyParams, Inbound, RpcRequest, RpcResponse, SymbolInfo,
    SymbolParams, METHOD_GET_CURRENCY, METHOD_GET_SYMBOL, METHOD_SUBSCRIBE_TICKER,
};
use crate::ingestors::transport::{FeedError, FeedTransport};

/// What happened to one streaming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Quote written to the slot of this symbol.
    Applied(Slot),
    /// Ticker for a symbol outside the registry; nothing written.
    UnknownSymbol(String),
    /// Frame could not be decoded; skipped.
    Malformed,
    /// Ack, error reply, or a method this service does not consume.
    Ignored,
}

pub struct TickerWssIngestor<T: FeedTransport> {
    transport: T,
    ctx: Arc<TickerContext>,
    next_id: u64,
}

impl<T: FeedTransport> TickerWssIngestor<T> {
    pub fn new(transport: T, ctx: Arc<TickerContext>) -> Self {
        Self {
            transport,
            ctx,
            next_id: 1,
        }
    }

    /// Resolves id, full name and fee currency for every registered symbol,
    /// in slot order. The first failure aborts the whole sequence.
    pub async fn initialize(&mut self) -> Result<(), FeedError> {
        self.ctx.health().set_state(FeedState::Initializing);
        let symbols: Vec<(Slot, String)> = self
            .ctx
            .registry()
            .iter()
            .map(|(slot, s)| (slot, s.to_string()))
            .collect();

        for (slot, symbol) in symbols {
            let info: SymbolInfo = self
                .request(METHOD_GET_SYMBOL, SymbolParams { symbol: &symbol })
                .await
                .inspect_err(|e| log::error!("getSymbol {} failed: {}", symbol, e))?;

            let currency: CurrencyInfo = self
                .request(
                    METHOD_GET_CURRENCY,
                    CurrencyParams {
                        currency: &info.base_currency,
                    },
                )
                .await
                .inspect_err(|e| log::error!("getCurrency {} failed: {}", info.base_currency, e))?;

            log::info!(
                "Resolved {} -> {} ({}), fee currency {}",
                symbol,
                info.base_currency,
                currency.full_name,
                info.fee_currency
            );
            self.ctx.set_static(
                slot,
                StaticFields {
                    id: info.base_currency,
                    full_name: currency.full_name,
                    fee_currency: info.fee_currency,
                },
            );
        }
        Ok(())
    }

    /// Sends one `subscribeTicker` per symbol without waiting for acks; the
    /// acks show up later in the stream and are ignored there.
    pub async fn subscribe_all(&mut self) -> Result<(), FeedError> {
        let symbols = self.ctx.registry().symbols().to_vec();
        for symbol in &symbols {
            let id = self.take_id();
            self.send(METHOD_SUBSCRIBE_TICKER, SymbolParams { symbol: symbol.as_str() }, id)
                .await
                .inspect_err(|e| log::error!("subscribeTicker {} failed: {}", symbol, e))?;
        }
        log::info!("Subscribed to {} tickers", symbols.len());
        self.ctx.health().set_state(FeedState::Streaming);
        Ok(())
    }

    /// Streams until `shutdown` fires (`Ok`) or the connection fails (`Err`).
    /// On failure the feed is marked disconnected; there is no reconnect.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), FeedError> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Ticker ingestor shutting down.");
                    return Ok(());
                }
                frame = self.transport.next_text() => {
                    let err = match frame {
                        Ok(Some(text)) => {
                            self.handle_text(&text);
                            continue;
                        }
                        Ok(None) => FeedError::Closed,
                        Err(e) => e,
                    };
                    log::error!("Ticker stream ended: {}", err);
                    self.ctx.health().set_state(FeedState::Disconnected);
                    return Err(err);
                }
            }
        }
    }

    /// Applies one streaming frame. Never fails: bad frames are counted and skipped.
    pub fn handle_text(&self, text: &str) -> IngestOutcome {
        let health = self.ctx.health();
        match decode_inbound(text) {
            Ok(Inbound::Ticker(params)) => {
                let event_time = params.timestamp;
                let symbol = params.symbol.clone();
                match self.ctx.lookup(&symbol) {
                    Some(slot) => {
                        self.ctx.write_quote(slot, params.into_quote());
                        health.record_update(event_time);
                        log::trace!("Applied ticker for {} at slot {}", symbol, slot);
                        IngestOutcome::Applied(slot)
                    }
                    None => {
                        health.record_unknown_symbol();
                        log::warn!("Dropping ticker for unregistered symbol '{}'", symbol);
                        IngestOutcome::UnknownSymbol(symbol)
                    }
                }
            }
            Ok(Inbound::Response { id, error }) => {
                health.record_ignored();
                match error {
                    Some(e) => log::warn!("Upstream error reply (id {:?}): {} ({})", id, e.message, e.code),
                    None => log::debug!("Upstream ack (id {:?})", id),
                }
                IngestOutcome::Ignored
            }
            Ok(Inbound::Other(method)) => {
                health.record_ignored();
                log::debug!("Ignoring upstream method '{}'", method);
                IngestOutcome::Ignored
            }
            Err(e) => {
                health.record_decode_error();
                log::warn!("Skipping malformed ticker frame: {} (payload: {})", e, text);
                IngestOutcome::Malformed
            }
        }
    }

    /// Hands the transport back, e.g. to close it after a failed initialization.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send<P: Serialize>(
        &mut self,
        method: &'static str,
        params: P,
        id: u64,
    ) -> Result<(), FeedError> {
        let text = serde_json::to_string(&RpcRequest { method, params, id })
            .map_err(|source| FeedError::Decode { method, source })?;
        self.transport.send_text(text).await
    }

    /// Sends a command and blocks on the next frame as its response.
    async fn request<P, R>(&mut self, method: &'static str, params: P) -> Result<R, FeedError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.take_id();
        self.send(method, params, id).await?;

        let text = self.transport.next_text().await?.ok_or(FeedError::Closed)?;
        let response: RpcResponse<R> =
            serde_json::from_str(&text).map_err(|source| FeedError::Decode { method, source })?;

        // An error for some other request is still not an answer to this one.
        if response.id != Some(id) {
            return Err(FeedError::Correlation {
                method,
                expected: id,
                got: response.id,
            });
        }
        if let Some(error) = response.error {
            return Err(FeedError::Rpc { method, error });
        }
        response.result.ok_or(FeedError::MissingResult { method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::TickerRecord;
    use std::collections::VecDeque;

    /// Replays canned inbound frames and records what was sent.
    #[derive(Default)]
    struct ScriptedTransport {
        inbound: VecDeque<Result<Option<String>, FeedError>>,
        sent: Vec<String>,
    }

    impl ScriptedTransport {
        fn push(&mut self, text: &str) {
            self.inbound.push_back(Ok(Some(text.to_string())));
        }
    }

    impl FeedTransport for ScriptedTransport {
        async fn send_text(&mut self, text: String) -> Result<(), FeedError> {
            self.sent.push(text);
            Ok(())
        }

        async fn next_text(&mut self) -> Result<Option<String>, FeedError> {
            self.inbound.pop_front().unwrap_or(Ok(None))
        }
    }

    fn context(symbols: &[&str]) -> Arc<TickerContext> {
        Arc::new(TickerContext::new(symbols.iter().map(|s| s.to_string()).collect()).unwrap())
    }

    fn symbol_reply(id: u64, base: &str, fee: &str) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","result":{{"id":"X","baseCurrency":"{base}","quoteCurrency":"{fee}","feeCurrency":"{fee}"}},"id":{id}}}"#
        )
    }

    fn currency_reply(id: u64, cur: &str, name: &str) -> String {
        format!(r#"{{"jsonrpc":"2.0","result":{{"id":"{cur}","fullName":"{name}","crypto":true}},"id":{id}}}"#)
    }

    fn ticker(symbol: &str, ask: &str) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","method":"ticker","params":{{"ask":"{ask}","bid":"0.054463","last":"0.054463","open":"0.057133","low":"0.053615","high":"0.057559","volume":"1","volumeQuote":"1","timestamp":"2017-10-19T15:45:44.941Z","symbol":"{symbol}"}}}}"#
        )
    }

    fn scripted_init() -> ScriptedTransport {
        let mut t = ScriptedTransport::default();
        t.push(&symbol_reply(1, "ETH", "BTC"));
        t.push(&currency_reply(2, "ETH", "Ethereum"));
        t.push(&symbol_reply(3, "BTC", "USD"));
        t.push(&currency_reply(4, "BTC", "Bitcoin"));
        t
    }

    #[tokio::test]
    async fn test_initialize_resolves_static_fields() {
        let ctx = context(&["ETHBTC", "BTCUSD"]);
        let mut ingestor = TickerWssIngestor::new(scripted_init(), Arc::clone(&ctx));
        ingestor.initialize().await.unwrap();

        let eth = ctx.read_symbol("ETHBTC").unwrap();
        assert_eq!(eth.id, "ETH");
        assert_eq!(eth.full_name, "Ethereum");
        assert_eq!(eth.fee_currency, "BTC");
        assert_eq!(eth.ask, "");

        let btc = ctx.read_symbol("BTCUSD").unwrap();
        assert_eq!(btc.id, "BTC");
        assert_eq!(btc.full_name, "Bitcoin");
        assert_eq!(btc.fee_currency, "USD");

        let sent = &ingestor.transport.sent;
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0], r#"{"method":"getSymbol","params":{"symbol":"ETHBTC"},"id":1}"#);
        assert_eq!(sent[1], r#"{"method":"getCurrency","params":{"currency":"ETH"},"id":2}"#);
    }

    #[tokio::test]
    async fn test_initialize_fails_on_error_reply() {
        let ctx = context(&["ETHBTC", "NOPE"]);
        let mut t = ScriptedTransport::default();
        t.push(&symbol_reply(1, "ETH", "BTC"));
        t.push(&currency_reply(2, "ETH", "Ethereum"));
        t.push(r#"{"jsonrpc":"2.0","error":{"code":2001,"message":"Symbol not found"},"id":3}"#);
        let mut ingestor = TickerWssIngestor::new(t, ctx);

        let err = ingestor.initialize().await.unwrap_err();
        assert!(matches!(err, FeedError::Rpc { method: "getSymbol", .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_initialize_fails_on_decode_error() {
        let ctx = context(&["ETHBTC"]);
        let mut t = ScriptedTransport::default();
        t.push(r#"{"jsonrpc":"2.0","result":{"id":"ETHBTC"},"id":1}"#);
        let mut ingestor = TickerWssIngestor::new(t, ctx);

        let err = ingestor.initialize().await.unwrap_err();
        assert!(matches!(err, FeedError::Decode { method: "getSymbol", .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_initialize_fails_on_id_mismatch() {
        let ctx = context(&["ETHBTC"]);
        let mut t = ScriptedTransport::default();
        t.push(&symbol_reply(99, "ETH", "BTC"));
        let mut ingestor = TickerWssIngestor::new(t, ctx);

        let err = ingestor.initialize().await.unwrap_err();
        assert!(
            matches!(err, FeedError::Correlation { expected: 1, got: Some(99), .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_error_reply_for_another_request_is_a_correlation_failure() {
        let ctx = context(&["ETHBTC"]);
        let mut t = ScriptedTransport::default();
        t.push(r#"{"jsonrpc":"2.0","error":{"code":2001,"message":"Symbol not found"},"id":7}"#);
        let mut ingestor = TickerWssIngestor::new(t, ctx);

        let err = ingestor.initialize().await.unwrap_err();
        assert!(
            matches!(err, FeedError::Correlation { method: "getSymbol", expected: 1, got: Some(7) }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_initialize_fails_on_closed_connection() {
        let ctx = context(&["ETHBTC", "BTCUSD"]);
        let mut t = ScriptedTransport::default();
        t.push(&symbol_reply(1, "ETH", "BTC"));
        let mut ingestor = TickerWssIngestor::new(t, ctx);

        let err = ingestor.initialize().await.unwrap_err();
        assert!(matches!(err, FeedError::Closed), "{err:?}");
    }

    #[tokio::test]
    async fn test_subscribe_all_sends_one_command_per_symbol() {
        let ctx = context(&["ETHBTC", "BTCUSD"]);
        let mut ingestor = TickerWssIngestor::new(ScriptedTransport::default(), Arc::clone(&ctx));
        ingestor.subscribe_all().await.unwrap();

        assert_eq!(
            ingestor.transport.sent,
            vec![
                r#"{"method":"subscribeTicker","params":{"symbol":"ETHBTC"},"id":1}"#.to_string(),
                r#"{"method":"subscribeTicker","params":{"symbol":"BTCUSD"},"id":2}"#.to_string(),
            ]
        );
        assert_eq!(ctx.health().state(), FeedState::Streaming);
    }

    #[test]
    fn test_handle_text_applies_quote() {
        let ctx = context(&["ETHBTC", "BTCUSD"]);
        let ingestor = TickerWssIngestor::new(ScriptedTransport::default(), Arc::clone(&ctx));

        let outcome = ingestor.handle_text(&ticker("ETHBTC", "0.054464"));
        assert_eq!(outcome, IngestOutcome::Applied(ctx.lookup("ETHBTC").unwrap()));

        let record = ctx.read_symbol("ETHBTC").unwrap();
        assert_eq!(record.ask, "0.054464");
        assert_eq!(record.bid, "0.054463");
        assert_eq!(record.open, "0.057133");
        assert_eq!(record.low, "0.053615");
        assert_eq!(record.high, "0.057559");
        assert_eq!(ctx.health().snapshot().updates_applied, 1);
    }

    #[test]
    fn test_handle_text_unknown_symbol_is_noop() {
        let ctx = context(&["ETHBTC", "BTCUSD"]);
        let ingestor = TickerWssIngestor::new(ScriptedTransport::default(), Arc::clone(&ctx));
        let before: Vec<TickerRecord> = ctx.read_all();

        let outcome = ingestor.handle_text(&ticker("XXXYYY", "1"));
        assert_eq!(outcome, IngestOutcome::UnknownSymbol("XXXYYY".to_string()));
        assert_eq!(
            serde_json::to_string(&ctx.read_all()).unwrap(),
            serde_json::to_string(&before).unwrap()
        );
        assert_eq!(ctx.health().snapshot().unknown_symbols, 1);
    }

    #[test]
    fn test_handle_text_ack_is_ignored() {
        let ctx = context(&["ETHBTC"]);
        let ingestor = TickerWssIngestor::new(ScriptedTransport::default(), Arc::clone(&ctx));
        let before = ctx.read_all();

        assert_eq!(
            ingestor.handle_text(r#"{"jsonrpc":"2.0","result":true,"id":5}"#),
            IngestOutcome::Ignored
        );
        assert_eq!(ctx.read_all(), before);
        assert_eq!(ctx.health().snapshot().ignored_messages, 1);
    }

    #[tokio::test]
    async fn test_run_survives_malformed_frame() {
        let ctx = context(&["ETHBTC", "BTCUSD"]);
        let mut t = ScriptedTransport::default();
        t.push(&ticker("ETHBTC", "1.1"));
        t.push(r#"{"method":"ticker","params":{"symbol":"ETHBTC","ask":42}"#);
        t.push(&ticker("BTCUSD", "2.2"));
        // stream then ends: transport returns Ok(None)

        let (_tx, rx) = broadcast::channel(1);
        let ingestor = TickerWssIngestor::new(t, Arc::clone(&ctx));
        ctx.health().set_state(FeedState::Streaming);
        let result = ingestor.run(rx).await;

        assert!(matches!(result, Err(FeedError::Closed)));
        assert_eq!(ctx.read_symbol("ETHBTC").unwrap().ask, "1.1");
        assert_eq!(ctx.read_symbol("BTCUSD").unwrap().ask, "2.2");

        let status = ctx.health().snapshot();
        assert_eq!(status.state, FeedState::Disconnected);
        assert_eq!(status.updates_applied, 2);
        assert_eq!(status.decode_errors, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_transport_error() {
        let ctx = context(&["ETHBTC"]);
        let mut t = ScriptedTransport::default();
        t.push(&ticker("ETHBTC", "1.1"));
        t.inbound.push_back(Err(FeedError::Transport("reset by peer".to_string())));
        t.push(&ticker("ETHBTC", "9.9"));

        let (_tx, rx) = broadcast::channel(1);
        let result = TickerWssIngestor::new(t, Arc::clone(&ctx)).run(rx).await;

        assert!(matches!(result, Err(FeedError::Transport(_))));
        // Nothing after the failure is applied.
        assert_eq!(ctx.read_symbol("ETHBTC").unwrap().ask, "1.1");
        assert_eq!(ctx.health().state(), FeedState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_returns_ok_on_shutdown() {
        struct Silent;
        impl FeedTransport for Silent {
            async fn send_text(&mut self, _text: String) -> Result<(), FeedError> {
                Ok(())
            }
            async fn next_text(&mut self) -> Result<Option<String>, FeedError> {
                std::future::pending().await
            }
        }

        let ctx = context(&["ETHBTC"]);
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(TickerWssIngestor::new(Silent, Arc::clone(&ctx)).run(rx));
        tx.send(()).unwrap();
        assert!(handle.await.unwrap().is_ok());
        assert_ne!(ctx.health().state(), FeedState::Disconnected);
    }
}
