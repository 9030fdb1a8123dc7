//! End-to-end ingestion pipeline: mock venues -> raw partitions ->
//! curation -> validated provider inputs.

use std::sync::Arc;

use async_trait::async_trait;
use candle_store::CandleStore;
use chrono::{DateTime, Duration, Utc};
use data_ingestion::{DataCuration, DataIngestion, IngestStatus, SignalDataProvider};
use signal_core::{
    Candle, FundingRate, Interval, Liquidation, OpenInterest, OrderBookDepth, Settings,
    VenueAdapter, VenueError,
};

struct MockVenue {
    name: &'static str,
    candles: Vec<Candle>,
}

impl MockVenue {
    fn new(name: &'static str, interval: Interval, bars: usize, price_offset: f64) -> Self {
        let now = Utc::now();
        let step = interval.duration();
        let raw_start = now - step * bars as i32;
        // Align to the interval grid so gap detection sees expected slots
        let aligned_ms = raw_start.timestamp_millis()
            - raw_start.timestamp_millis().rem_euclid(step.num_milliseconds());
        let start = DateTime::from_timestamp_millis(aligned_ms).unwrap();
        let candles = (0..bars)
            .map(|i| {
                let open_time = start + step * i as i32;
                let price = 100.0 + price_offset + (i % 7) as f64;
                Candle {
                    venue: name.to_string(),
                    symbol: "BTCUSDT".to_string(),
                    interval,
                    open_time,
                    close_time: Candle::close_time_for(open_time, interval),
                    open: price,
                    high: price + 2.0,
                    low: price - 2.0,
                    close: price + 1.0,
                    volume: 10.0 + i as f64 % 3.0,
                    taker_buy_base: None,
                    best_bid_price: None,
                    best_ask_price: None,
                    bid_depth: None,
                    ask_depth: None,
                    relative_volume: None,
                }
            })
            .collect();
        Self { name, candles }
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn venue(&self) -> &str {
        self.name
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, VenueError> {
        Ok(self
            .candles
            .iter()
            .filter(|c| start.map_or(true, |s| c.open_time >= s))
            .filter(|c| end.map_or(true, |e| c.open_time <= e))
            .cloned()
            .collect())
    }

    async fn fetch_orderbook(&self, symbol: &str, _depth: u32) -> Result<OrderBookDepth, VenueError> {
        Ok(OrderBookDepth {
            venue: self.name.to_string(),
            symbol: symbol.to_string(),
            best_bid: 100.0,
            best_ask: 100.2,
            bid_depth: 500.0,
            ask_depth: 480.0,
            timestamp: Utc::now(),
        })
    }

    async fn fetch_funding(
        &self,
        _symbol: &str,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FundingRate>, VenueError> {
        Ok(Vec::new())
    }

    async fn fetch_open_interest(&self, _symbol: &str) -> Result<Vec<OpenInterest>, VenueError> {
        Ok(Vec::new())
    }

    async fn fetch_liquidations(
        &self,
        _symbol: &str,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Liquidation>, VenueError> {
        Ok(Vec::new())
    }
}

fn test_store(dir: &tempfile::TempDir) -> CandleStore {
    CandleStore::new(dir.path().join("raw"), dir.path().join("curated"))
}

#[tokio::test]
async fn ingest_curate_and_provide_validated_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);
    let settings = Settings::default();

    for interval in [Interval::H1, Interval::D1] {
        let venues: Vec<Arc<dyn VenueAdapter>> = vec![
            Arc::new(MockVenue::new("binance", interval, 240, 0.0)),
            Arc::new(MockVenue::new("bybit", interval, 240, 0.5)),
        ];
        let ingestion = DataIngestion::new(venues, store.clone(), &settings);
        let report = ingestion
            .ingest_window("BTCUSDT", interval, None, None)
            .await
            .unwrap();
        assert_eq!(report.status, IngestStatus::Ok);
        assert_eq!(report.rows_per_venue.len(), 2);

        let curation = DataCuration::new(
            store.clone(),
            vec!["binance".to_string(), "bybit".to_string()],
        );
        let curated = curation.curate("BTCUSDT", interval).unwrap();
        assert_eq!(curated.rows, 240);
        assert!(curated.unfilled_gaps.is_empty());
    }

    let curation = DataCuration::new(
        store.clone(),
        vec!["binance".to_string(), "bybit".to_string()],
    );
    let provider = SignalDataProvider::new(curation, "BTCUSDT");
    let inputs = provider.get_validated_inputs(false).await.unwrap();

    assert_eq!(inputs.symbol, "BTCUSDT");
    assert_eq!(inputs.venue, "binance");
    assert_eq!(inputs.df_1h.len(), 240);
    assert_eq!(inputs.df_1d.len(), 240);
    // Curation appended the canonical indicator columns
    assert!(inputs.df_1d.column("ema_21").is_some());
    assert!(inputs.df_1d.column("rsi_14").is_some());
    // Reconciliation preferred binance and split volume shares
    assert!(inputs.df_1d.relative_volume.iter().all(|v| *v > 0.0 && *v <= 1.0));

    // Cached snapshot is reused
    let again = provider.get_validated_inputs(false).await.unwrap();
    assert!(Arc::ptr_eq(&inputs.df_1d, &again.df_1d));
}

#[tokio::test]
async fn gap_detection_over_raw_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let store = test_store(&dir);
    let settings = Settings::default();

    let mut venue = MockVenue::new("binance", Interval::H1, 48, 0.0);
    // Remove 5 consecutive bars to form a gap beyond tolerance
    venue.candles.drain(20..25);
    let start = venue.candles.first().unwrap().open_time;
    let end = venue.candles.last().unwrap().open_time + Duration::hours(1);

    let ingestion = DataIngestion::new(vec![Arc::new(venue)], store, &settings);
    ingestion
        .ingest_window("BTCUSDT", Interval::H1, None, None)
        .await
        .unwrap();

    let gaps = ingestion
        .check_gaps("BTCUSDT", Interval::H1, start, end)
        .unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].missing_candles, 5);
}
