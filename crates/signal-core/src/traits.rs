use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::VenueError;
use crate::types::{Candle, FundingRate, Interval, Liquidation, OpenInterest, OrderBookDepth};

/// Contract implemented by every exchange venue adapter.
///
/// Adapters normalize the venue API into canonical types and surface typed
/// failures; transport retries with backoff belong to the scheduler.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Canonical venue name used in partitions and candle identity.
    fn venue(&self) -> &str;

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, VenueError>;

    async fn fetch_orderbook(&self, symbol: &str, depth: u32)
        -> Result<OrderBookDepth, VenueError>;

    async fn fetch_funding(
        &self,
        symbol: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FundingRate>, VenueError>;

    async fn fetch_open_interest(&self, symbol: &str) -> Result<Vec<OpenInterest>, VenueError>;

    async fn fetch_liquidations(
        &self,
        symbol: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Liquidation>, VenueError>;
}
