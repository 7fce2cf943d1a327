//! Network URL constants for the upstream services.

/// Default price API base URL (CoinGecko v3).
pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Default macro series API base URL (FRED).
pub const DEFAULT_MACRO_API_URL: &str = "https://api.stlouisfed.org/fred";

/// Default live ticker stream (Binance 24h ticker for BTC/USDT).
pub const DEFAULT_LIVE_FEED_URL: &str = "wss://stream.binance.com:9443/ws/btcusdt@ticker";
