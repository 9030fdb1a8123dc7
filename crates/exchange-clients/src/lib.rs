pub mod binance;
pub mod bybit;
pub mod rate_limit;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use rate_limit::RateLimiter;

use signal_core::{Settings, VenueAdapter};
use std::sync::Arc;

/// Build the default venue adapter set from settings: Binance first (the
/// deepest-liquidity venue, preferred on reconciliation conflicts), then
/// Bybit.
pub fn default_venues(settings: &Settings) -> Vec<Arc<dyn VenueAdapter>> {
    vec![
        Arc::new(BinanceClient::new(settings)) as Arc<dyn VenueAdapter>,
        Arc::new(BybitClient::new(settings)),
    ]
}
