use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use signal_core::{
    Candle, FundingRate, Interval, Liquidation, OpenInterest, OrderBookDepth, Settings,
    VenueAdapter, VenueError,
};

use crate::rate_limit::RateLimiter;

const VENUE: &str = "binance";
const KLINES_PAGE_LIMIT: usize = 1000;
const DEFAULT_FUTURES_URL: &str = "https://fapi.binance.com";

/// Binance spot market data client. Public endpoints only; the shared
/// rate limiter keeps the request budget under the venue's published
/// weight limits.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    futures_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl BinanceClient {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: settings.binance_api_base_url.trim_end_matches('/').to_string(),
            futures_url: DEFAULT_FUTURES_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(
                settings.binance_rate_limit_requests,
                Duration::from_secs(settings.binance_rate_limit_window_secs),
            ),
        }
    }

    pub fn with_futures_base(mut self, url: impl Into<String>) -> Self {
        self.futures_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Rate-limited GET with automatic retry on 429.
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, VenueError> {
        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let response = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| VenueError::Net {
                    venue: VENUE.to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if status.as_u16() == 429 || status.as_u16() == 418 {
                let wait_secs = 15u64;
                tracing::warn!(
                    attempt = attempt + 1,
                    wait_secs,
                    "binance rate limited, backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                continue;
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(VenueError::Auth {
                    venue: VENUE.to_string(),
                    message: format!("status {status}"),
                });
            }
            if !status.is_success() {
                return Err(VenueError::Net {
                    venue: VENUE.to_string(),
                    message: format!("status {status} from {url}"),
                });
            }
            return response.json::<Value>().await.map_err(|e| VenueError::Parse {
                venue: VENUE.to_string(),
                message: e.to_string(),
            });
        }
        Err(VenueError::Rate {
            venue: VENUE.to_string(),
            message: "rate limited after 3 retries".to_string(),
        })
    }

    fn parse_kline(&self, row: &Value, symbol: &str, interval: Interval) -> Result<Candle, VenueError> {
        let arr = row.as_array().ok_or_else(|| self.parse_err("kline row is not an array"))?;
        if arr.len() < 7 {
            return Err(self.parse_err("kline row too short"));
        }
        let open_time = arr[0]
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| self.parse_err("bad open time"))?;
        Ok(Candle {
            venue: VENUE.to_string(),
            symbol: symbol.to_string(),
            interval,
            open_time,
            close_time: Candle::close_time_for(open_time, interval),
            open: str_f64(&arr[1]).ok_or_else(|| self.parse_err("bad open"))?,
            high: str_f64(&arr[2]).ok_or_else(|| self.parse_err("bad high"))?,
            low: str_f64(&arr[3]).ok_or_else(|| self.parse_err("bad low"))?,
            close: str_f64(&arr[4]).ok_or_else(|| self.parse_err("bad close"))?,
            volume: str_f64(&arr[5]).ok_or_else(|| self.parse_err("bad volume"))?,
            taker_buy_base: arr.get(9).and_then(str_f64),
            best_bid_price: None,
            best_ask_price: None,
            bid_depth: None,
            ask_depth: None,
            relative_volume: None,
        })
    }

    fn parse_err(&self, message: &str) -> VenueError {
        VenueError::Parse {
            venue: VENUE.to_string(),
            message: message.to_string(),
        }
    }
}

fn str_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[async_trait]
impl VenueAdapter for BinanceClient {
    fn venue(&self) -> &str {
        VENUE
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, VenueError> {
        let url = format!("{}/klines", self.base_url);
        let mut candles: Vec<Candle> = Vec::new();
        let mut cursor = start;

        loop {
            let mut query = vec![
                ("symbol".to_string(), symbol.to_string()),
                ("interval".to_string(), interval.as_str().to_string()),
                ("limit".to_string(), KLINES_PAGE_LIMIT.to_string()),
            ];
            if let Some(s) = cursor {
                query.push(("startTime".to_string(), s.timestamp_millis().to_string()));
            }
            if let Some(e) = end {
                query.push(("endTime".to_string(), e.timestamp_millis().to_string()));
            }

            let body = self.get_json(&url, &query).await?;
            let rows = body.as_array().ok_or_else(|| self.parse_err("klines response is not an array"))?;
            if rows.is_empty() {
                break;
            }

            let page: Result<Vec<Candle>, VenueError> = rows
                .iter()
                .map(|row| self.parse_kline(row, symbol, interval))
                .collect();
            let page = page?;
            let page_len = page.len();
            let last_open = page.last().map(|c| c.open_time);
            candles.extend(page);

            // Continue paging only when the venue filled the page
            if page_len < KLINES_PAGE_LIMIT {
                break;
            }
            match (last_open, end) {
                (Some(last), Some(e)) if last + interval.duration() >= e => break,
                (Some(last), _) => cursor = Some(last + interval.duration()),
                (None, _) => break,
            }
        }

        tracing::debug!(symbol, interval = %interval, rows = candles.len(), "fetched binance klines");
        Ok(candles)
    }

    async fn fetch_orderbook(&self, symbol: &str, depth: u32) -> Result<OrderBookDepth, VenueError> {
        let url = format!("{}/depth", self.base_url);
        let query = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("limit".to_string(), depth.to_string()),
        ];
        let body = self.get_json(&url, &query).await?;

        let side_levels = |key: &str| -> Result<Vec<(f64, f64)>, VenueError> {
            body[key]
                .as_array()
                .ok_or_else(|| self.parse_err("depth side missing"))?
                .iter()
                .map(|level| {
                    let arr = level.as_array().ok_or_else(|| self.parse_err("depth level not array"))?;
                    let price = arr.first().and_then(str_f64).ok_or_else(|| self.parse_err("bad level price"))?;
                    let qty = arr.get(1).and_then(str_f64).ok_or_else(|| self.parse_err("bad level qty"))?;
                    Ok((price, qty))
                })
                .collect()
        };

        let bids = side_levels("bids")?;
        let asks = side_levels("asks")?;
        let best_bid = bids.first().map(|(p, _)| *p).ok_or_else(|| self.parse_err("empty bids"))?;
        let best_ask = asks.first().map(|(p, _)| *p).ok_or_else(|| self.parse_err("empty asks"))?;

        Ok(OrderBookDepth {
            venue: VENUE.to_string(),
            symbol: symbol.to_string(),
            best_bid,
            best_ask,
            bid_depth: bids.iter().map(|(_, q)| q).sum(),
            ask_depth: asks.iter().map(|(_, q)| q).sum(),
            timestamp: Utc::now(),
        })
    }

    async fn fetch_funding(
        &self,
        symbol: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FundingRate>, VenueError> {
        let url = format!("{}/fapi/v1/fundingRate", self.futures_url);
        let mut query = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("limit".to_string(), "200".to_string()),
        ];
        if let Some(s) = start {
            query.push(("startTime".to_string(), s.timestamp_millis().to_string()));
        }
        if let Some(e) = end {
            query.push(("endTime".to_string(), e.timestamp_millis().to_string()));
        }
        let body = self.get_json(&url, &query).await?;
        let rows = body.as_array().ok_or_else(|| self.parse_err("funding response not an array"))?;

        rows.iter()
            .map(|row| {
                let funding_time = row["fundingTime"]
                    .as_i64()
                    .and_then(DateTime::from_timestamp_millis)
                    .ok_or_else(|| self.parse_err("bad funding time"))?;
                Ok(FundingRate {
                    venue: VENUE.to_string(),
                    symbol: symbol.to_string(),
                    funding_time,
                    funding_rate: str_f64(&row["fundingRate"])
                        .ok_or_else(|| self.parse_err("bad funding rate"))?,
                })
            })
            .collect()
    }

    async fn fetch_open_interest(&self, symbol: &str) -> Result<Vec<OpenInterest>, VenueError> {
        let url = format!("{}/futures/data/openInterestHist", self.futures_url);
        let query = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("period".to_string(), "5m".to_string()),
            ("limit".to_string(), "200".to_string()),
        ];
        let body = self.get_json(&url, &query).await?;
        let rows = body.as_array().ok_or_else(|| self.parse_err("open interest response not an array"))?;

        rows.iter()
            .map(|row| {
                let timestamp = row["timestamp"]
                    .as_i64()
                    .and_then(DateTime::from_timestamp_millis)
                    .ok_or_else(|| self.parse_err("bad open interest timestamp"))?;
                Ok(OpenInterest {
                    venue: VENUE.to_string(),
                    symbol: symbol.to_string(),
                    timestamp,
                    open_interest: str_f64(&row["sumOpenInterest"])
                        .ok_or_else(|| self.parse_err("bad open interest"))?,
                })
            })
            .collect()
    }

    async fn fetch_liquidations(
        &self,
        symbol: &str,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Liquidation>, VenueError> {
        // Binance removed the public force-orders REST endpoint; the feed
        // is websocket-only and needs a persistent subscription.
        tracing::debug!(symbol, "binance liquidations unavailable over REST, returning empty");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BinanceClient {
        BinanceClient::new(&Settings::default())
    }

    #[test]
    fn parses_kline_row() {
        let row = serde_json::json!([
            1736899200000i64,
            "100.1",
            "105.5",
            "99.2",
            "104.0",
            "1234.5",
            1736902799999i64,
            "128000.0",
            420,
            "600.25",
            "62000.0",
            "0"
        ]);
        let candle = client().parse_kline(&row, "BTCUSDT", Interval::H1).unwrap();
        assert_eq!(candle.open, 100.1);
        assert_eq!(candle.close, 104.0);
        assert_eq!(candle.taker_buy_base, Some(600.25));
        assert_eq!(
            candle.close_time,
            Candle::close_time_for(candle.open_time, Interval::H1)
        );
    }

    #[test]
    fn rejects_malformed_kline() {
        let row = serde_json::json!([1736899200000i64, "not-a-number"]);
        assert!(matches!(
            client().parse_kline(&row, "BTCUSDT", Interval::H1),
            Err(VenueError::Parse { .. })
        ));
    }

    #[test]
    fn str_f64_accepts_strings_and_numbers() {
        assert_eq!(str_f64(&serde_json::json!("1.5")), Some(1.5));
        assert_eq!(str_f64(&serde_json::json!(2.5)), Some(2.5));
        assert_eq!(str_f64(&serde_json::json!(null)), None);
    }
}
