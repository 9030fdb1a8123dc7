use crate::error::ConfigError;

/// Application settings, loaded once at boot and threaded explicitly
/// through constructors. Every recognized environment variable is an
/// enumerated field; a malformed value rejects at load time.
#[derive(Debug, Clone)]
pub struct Settings {
    // Database
    pub database_url: String,

    // Venue APIs
    pub binance_api_base_url: String,
    pub binance_rate_limit_requests: usize,
    pub binance_rate_limit_window_secs: u64,
    pub bybit_api_base_url: String,

    // Logging
    pub log_level: String,

    // Scheduler
    pub scheduler_timezone: String,
    /// "HH:MM" UTC time of the daily curate+signal window.
    pub recommendation_update_time: (u32, u32),

    // Preflight maintenance
    pub prestart_maintenance: bool,
    pub prestart_lookback_days: i64,
    pub prestart_backfill_chunk: usize,
    pub prestart_backfill_pause_secs: f64,

    // Risk thresholds
    pub risk_ruin_alert_threshold: f64,
    pub risk_of_ruin_max: f64,
    pub daily_risk_limit_pct: f64,
    pub daily_risk_warning_pct: f64,
    pub risk_reward_floor: f64,

    // Cooldown
    pub cooldown_losing_streak_threshold: u32,
    pub cooldown_losing_streak_hours: i64,
    pub cooldown_max_trades_24h: u32,
    pub cooldown_overtrading_hours: i64,

    // Leverage
    pub leverage_warning_threshold: f64,
    pub leverage_hard_stop_threshold: f64,
    pub leverage_hard_stop_persistence_minutes: i64,

    // Exposure
    pub exposure_limit_multiplier: f64,
    pub exposure_alert_threshold_pct: f64,
    pub exposure_alert_persistence_minutes: i64,

    // Data layout
    pub data_dir: String,
    pub raw_data_dir: String,
    pub curated_data_dir: String,
    pub artifacts_dir: String,
    pub snapshots_dir: String,

    // Compliance
    pub worm_retention_days: i64,

    // Alerts
    pub alert_webhook_url: Option<String>,

    // Single-user default
    pub default_user_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/trading.db".to_string(),
            binance_api_base_url: "https://api.binance.com/api/v3".to_string(),
            binance_rate_limit_requests: 1200,
            binance_rate_limit_window_secs: 60,
            bybit_api_base_url: "https://api.bybit.com".to_string(),
            log_level: "info".to_string(),
            scheduler_timezone: "UTC".to_string(),
            recommendation_update_time: (12, 0),
            prestart_maintenance: true,
            prestart_lookback_days: 30,
            prestart_backfill_chunk: 900,
            prestart_backfill_pause_secs: 0.2,
            risk_ruin_alert_threshold: 0.05,
            risk_of_ruin_max: 0.05,
            daily_risk_limit_pct: 3.0,
            daily_risk_warning_pct: 2.0,
            risk_reward_floor: 1.2,
            cooldown_losing_streak_threshold: 3,
            cooldown_losing_streak_hours: 24,
            cooldown_max_trades_24h: 8,
            cooldown_overtrading_hours: 12,
            leverage_warning_threshold: 2.0,
            leverage_hard_stop_threshold: 3.0,
            leverage_hard_stop_persistence_minutes: 60,
            exposure_limit_multiplier: 2.0,
            exposure_alert_threshold_pct: 0.8,
            exposure_alert_persistence_minutes: 15,
            data_dir: "./data".to_string(),
            raw_data_dir: "./data/raw".to_string(),
            curated_data_dir: "./data/curated".to_string(),
            artifacts_dir: "./artifacts".to_string(),
            snapshots_dir: "./data/snapshots".to_string(),
            worm_retention_days: 365,
            alert_webhook_url: None,
            default_user_id: "00000000-0000-0000-0000-000000000001".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults for
    /// unset variables. Malformed values are rejected, never silently
    /// defaulted.
    pub fn from_env() -> Result<Settings, ConfigError> {
        let defaults = Settings::default();

        let recommendation_update_time = match std::env::var("RECOMMENDATION_UPDATE_TIME") {
            Ok(raw) => parse_update_time(&raw)?,
            Err(_) => defaults.recommendation_update_time,
        };

        Ok(Settings {
            database_url: env_string("DATABASE_URL", defaults.database_url),
            binance_api_base_url: env_string("BINANCE_API_BASE_URL", defaults.binance_api_base_url),
            binance_rate_limit_requests: env_parse(
                "BINANCE_RATE_LIMIT_REQUESTS",
                defaults.binance_rate_limit_requests,
            )?,
            binance_rate_limit_window_secs: env_parse(
                "BINANCE_RATE_LIMIT_WINDOW",
                defaults.binance_rate_limit_window_secs,
            )?,
            bybit_api_base_url: env_string("BYBIT_API_BASE_URL", defaults.bybit_api_base_url),
            log_level: env_string("LOG_LEVEL", defaults.log_level),
            scheduler_timezone: env_string("SCHEDULER_TIMEZONE", defaults.scheduler_timezone),
            recommendation_update_time,
            prestart_maintenance: env_parse("PRESTART_MAINTENANCE", defaults.prestart_maintenance)?,
            prestart_lookback_days: env_parse(
                "PRESTART_LOOKBACK_DAYS",
                defaults.prestart_lookback_days,
            )?,
            prestart_backfill_chunk: env_parse(
                "PRESTART_BACKFILL_CHUNK",
                defaults.prestart_backfill_chunk,
            )?,
            prestart_backfill_pause_secs: env_parse(
                "PRESTART_BACKFILL_PAUSE_SECONDS",
                defaults.prestart_backfill_pause_secs,
            )?,
            risk_ruin_alert_threshold: env_parse(
                "RISK_RUIN_ALERT_THRESHOLD",
                defaults.risk_ruin_alert_threshold,
            )?,
            risk_of_ruin_max: env_parse("RISK_OF_RUIN_MAX", defaults.risk_of_ruin_max)?,
            daily_risk_limit_pct: env_parse("DAILY_RISK_LIMIT_PCT", defaults.daily_risk_limit_pct)?,
            daily_risk_warning_pct: env_parse(
                "DAILY_RISK_WARNING_PCT",
                defaults.daily_risk_warning_pct,
            )?,
            risk_reward_floor: env_parse("RISK_REWARD_FLOOR", defaults.risk_reward_floor)?,
            cooldown_losing_streak_threshold: env_parse(
                "COOLDOWN_LOSING_STREAK_THRESHOLD",
                defaults.cooldown_losing_streak_threshold,
            )?,
            cooldown_losing_streak_hours: env_parse(
                "COOLDOWN_LOSING_STREAK_HOURS",
                defaults.cooldown_losing_streak_hours,
            )?,
            cooldown_max_trades_24h: env_parse(
                "COOLDOWN_MAX_TRADES_24H",
                defaults.cooldown_max_trades_24h,
            )?,
            cooldown_overtrading_hours: env_parse(
                "COOLDOWN_OVERTRADING_HOURS",
                defaults.cooldown_overtrading_hours,
            )?,
            leverage_warning_threshold: env_parse(
                "LEVERAGE_WARNING_THRESHOLD",
                defaults.leverage_warning_threshold,
            )?,
            leverage_hard_stop_threshold: env_parse(
                "LEVERAGE_HARD_STOP_THRESHOLD",
                defaults.leverage_hard_stop_threshold,
            )?,
            leverage_hard_stop_persistence_minutes: env_parse(
                "LEVERAGE_HARD_STOP_PERSISTENCE_MINUTES",
                defaults.leverage_hard_stop_persistence_minutes,
            )?,
            exposure_limit_multiplier: env_parse(
                "EXPOSURE_LIMIT_MULTIPLIER",
                defaults.exposure_limit_multiplier,
            )?,
            exposure_alert_threshold_pct: env_parse(
                "EXPOSURE_ALERT_THRESHOLD_PCT",
                defaults.exposure_alert_threshold_pct,
            )?,
            exposure_alert_persistence_minutes: env_parse(
                "EXPOSURE_ALERT_PERSISTENCE_MINUTES",
                defaults.exposure_alert_persistence_minutes,
            )?,
            data_dir: env_string("DATA_DIR", defaults.data_dir),
            raw_data_dir: env_string("RAW_DATA_DIR", defaults.raw_data_dir),
            curated_data_dir: env_string("CURATED_DATA_DIR", defaults.curated_data_dir),
            artifacts_dir: env_string("ARTIFACTS_DIR", defaults.artifacts_dir),
            snapshots_dir: env_string("SNAPSHOTS_DIR", defaults.snapshots_dir),
            worm_retention_days: env_parse("WORM_RETENTION_DAYS", defaults.worm_retention_days)?,
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            default_user_id: env_string("DEFAULT_USER_ID", defaults.default_user_id),
        })
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_update_time(raw: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "RECOMMENDATION_UPDATE_TIME".to_string(),
        value: raw.to_string(),
        reason: "expected HH:MM".to_string(),
    };
    let (h, m) = raw.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.parse().map_err(|_| invalid())?;
    let minute: u32 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_time_parses() {
        assert_eq!(parse_update_time("12:00").unwrap(), (12, 0));
        assert_eq!(parse_update_time("00:30").unwrap(), (0, 30));
        assert!(parse_update_time("24:00").is_err());
        assert!(parse_update_time("noon").is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.binance_rate_limit_requests, 1200);
        assert_eq!(s.risk_reward_floor, 1.2);
        assert_eq!(s.exposure_limit_multiplier, 2.0);
        assert!(s.alert_webhook_url.is_none());
    }
}
