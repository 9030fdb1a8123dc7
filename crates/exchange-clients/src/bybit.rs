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

const VENUE: &str = "bybit";

/// Bybit v5 market data client (spot klines and order book, linear
/// contracts for funding and open interest).
#[derive(Clone)]
pub struct BybitClient {
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl BybitClient {
    pub fn new(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: settings.bybit_api_base_url.trim_end_matches('/').to_string(),
            client,
            // Bybit public endpoints allow 120 req / 5 s per IP
            rate_limiter: RateLimiter::new(120, Duration::from_secs(5)),
        }
    }

    fn kline_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M15 => "15",
            Interval::M30 => "30",
            Interval::H1 => "60",
            Interval::H4 => "240",
            Interval::D1 => "D",
            Interval::W1 => "W",
        }
    }

    async fn get_result(&self, path: &str, query: &[(String, String)]) -> Result<Value, VenueError> {
        self.rate_limiter.acquire().await;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| VenueError::Net {
                venue: VENUE.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 403 {
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

        let body: Value = response.json().await.map_err(|e| VenueError::Parse {
            venue: VENUE.to_string(),
            message: e.to_string(),
        })?;

        let ret_code = body["retCode"].as_i64().unwrap_or(-1);
        if ret_code == 10006 {
            return Err(VenueError::Rate {
                venue: VENUE.to_string(),
                message: body["retMsg"].as_str().unwrap_or("rate limited").to_string(),
            });
        }
        if ret_code != 0 {
            return Err(VenueError::Parse {
                venue: VENUE.to_string(),
                message: format!("retCode {ret_code}: {}", body["retMsg"].as_str().unwrap_or("")),
            });
        }
        Ok(body["result"].clone())
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

fn str_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[async_trait]
impl VenueAdapter for BybitClient {
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
        let mut query = vec![
            ("category".to_string(), "spot".to_string()),
            ("symbol".to_string(), symbol.to_string()),
            ("interval".to_string(), Self::kline_interval(interval).to_string()),
            ("limit".to_string(), "1000".to_string()),
        ];
        if let Some(s) = start {
            query.push(("start".to_string(), s.timestamp_millis().to_string()));
        }
        if let Some(e) = end {
            query.push(("end".to_string(), e.timestamp_millis().to_string()));
        }

        let result = self.get_result("/v5/market/kline", &query).await?;
        let rows = result["list"]
            .as_array()
            .ok_or_else(|| self.parse_err("kline list missing"))?;

        // Bybit returns newest-first
        let mut candles: Vec<Candle> = rows
            .iter()
            .rev()
            .map(|row| {
                let arr = row.as_array().ok_or_else(|| self.parse_err("kline row not array"))?;
                if arr.len() < 6 {
                    return Err(self.parse_err("kline row too short"));
                }
                let open_time = str_i64(&arr[0])
                    .and_then(DateTime::from_timestamp_millis)
                    .ok_or_else(|| self.parse_err("bad start time"))?;
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
                    taker_buy_base: None,
                    best_bid_price: None,
                    best_ask_price: None,
                    bid_depth: None,
                    ask_depth: None,
                    relative_volume: None,
                })
            })
            .collect::<Result<_, _>>()?;
        candles.sort_by_key(|c| c.open_time);

        tracing::debug!(symbol, interval = %interval, rows = candles.len(), "fetched bybit klines");
        Ok(candles)
    }

    async fn fetch_orderbook(&self, symbol: &str, depth: u32) -> Result<OrderBookDepth, VenueError> {
        let query = vec![
            ("category".to_string(), "spot".to_string()),
            ("symbol".to_string(), symbol.to_string()),
            ("limit".to_string(), depth.to_string()),
        ];
        let result = self.get_result("/v5/market/orderbook", &query).await?;

        let side = |key: &str| -> Result<Vec<(f64, f64)>, VenueError> {
            result[key]
                .as_array()
                .ok_or_else(|| self.parse_err("orderbook side missing"))?
                .iter()
                .map(|level| {
                    let arr = level.as_array().ok_or_else(|| self.parse_err("level not array"))?;
                    let price = arr.first().and_then(str_f64).ok_or_else(|| self.parse_err("bad price"))?;
                    let qty = arr.get(1).and_then(str_f64).ok_or_else(|| self.parse_err("bad qty"))?;
                    Ok((price, qty))
                })
                .collect()
        };

        let bids = side("b")?;
        let asks = side("a")?;
        let timestamp = str_i64(&result["ts"])
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Ok(OrderBookDepth {
            venue: VENUE.to_string(),
            symbol: symbol.to_string(),
            best_bid: bids.first().map(|(p, _)| *p).ok_or_else(|| self.parse_err("empty bids"))?,
            best_ask: asks.first().map(|(p, _)| *p).ok_or_else(|| self.parse_err("empty asks"))?,
            bid_depth: bids.iter().map(|(_, q)| q).sum(),
            ask_depth: asks.iter().map(|(_, q)| q).sum(),
            timestamp,
        })
    }

    async fn fetch_funding(
        &self,
        symbol: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FundingRate>, VenueError> {
        let mut query = vec![
            ("category".to_string(), "linear".to_string()),
            ("symbol".to_string(), symbol.to_string()),
            ("limit".to_string(), "200".to_string()),
        ];
        if let Some(s) = start {
            query.push(("startTime".to_string(), s.timestamp_millis().to_string()));
        }
        if let Some(e) = end {
            query.push(("endTime".to_string(), e.timestamp_millis().to_string()));
        }
        let result = self.get_result("/v5/market/funding/history", &query).await?;
        let rows = result["list"]
            .as_array()
            .ok_or_else(|| self.parse_err("funding list missing"))?;

        rows.iter()
            .map(|row| {
                let funding_time = str_i64(&row["fundingRateTimestamp"])
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
        let query = vec![
            ("category".to_string(), "linear".to_string()),
            ("symbol".to_string(), symbol.to_string()),
            ("intervalTime".to_string(), "5min".to_string()),
            ("limit".to_string(), "200".to_string()),
        ];
        let result = self.get_result("/v5/market/open-interest", &query).await?;
        let rows = result["list"]
            .as_array()
            .ok_or_else(|| self.parse_err("open interest list missing"))?;

        rows.iter()
            .map(|row| {
                let timestamp = str_i64(&row["timestamp"])
                    .and_then(DateTime::from_timestamp_millis)
                    .ok_or_else(|| self.parse_err("bad open interest timestamp"))?;
                Ok(OpenInterest {
                    venue: VENUE.to_string(),
                    symbol: symbol.to_string(),
                    timestamp,
                    open_interest: str_f64(&row["openInterest"])
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
        // Liquidation events are websocket-only on bybit v5
        tracing::debug!(symbol, "bybit liquidations unavailable over REST, returning empty");
        Ok(Vec::new())
    }
}
