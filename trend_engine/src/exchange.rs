//! exchange.rs: Collaborator interfaces consumed by the trader loop
//!
//! The core only distinguishes confirmed from not-confirmed outcomes.
//! Timeouts, retries and transport classification live behind these traits.

#![allow(async_fn_in_trait)]

use std::sync::Arc;

use crate::error::EngineResult;
use crate::models::{AccountState, Candle, CloseResult, OrderResult, OrderType, Side};

pub trait MarketDataSource {
    /// Candles ordered by `open_time`, strictly increasing.
    async fn get_recent_candles(&self, symbol: &str, interval: &str, limit: usize) -> EngineResult<Vec<Candle>>;
}

pub trait OrderGateway {
    async fn open_position(&self, side: Side, quantity: f64, order_type: OrderType) -> EngineResult<OrderResult>;

    async fn close_position(&self) -> EngineResult<CloseResult>;
}

pub trait AccountQuery {
    async fn get_balance(&self) -> EngineResult<AccountState>;
}

impl<T: MarketDataSource> MarketDataSource for Arc<T> {
    async fn get_recent_candles(&self, symbol: &str, interval: &str, limit: usize) -> EngineResult<Vec<Candle>> {
        (**self).get_recent_candles(symbol, interval, limit).await
    }
}

impl<T: OrderGateway> OrderGateway for Arc<T> {
    async fn open_position(&self, side: Side, quantity: f64, order_type: OrderType) -> EngineResult<OrderResult> {
        (**self).open_position(side, quantity, order_type).await
    }

    async fn close_position(&self) -> EngineResult<CloseResult> {
        (**self).close_position().await
    }
}

impl<T: AccountQuery> AccountQuery for Arc<T> {
    async fn get_balance(&self) -> EngineResult<AccountState> {
        (**self).get_balance().await
    }
}
