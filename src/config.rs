#[derive(Clone, Debug)]
pub struct Config {
    pub source_base_url: String,
    pub source_rps: u32,
    pub page_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let source_base_url = std::env::var("SOURCE_BASE_URL")
            .unwrap_or_else(|_| "https://fzmovies.net".to_string());

        let source_rps: u32 =
            std::env::var("SOURCE_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(2);

        let page_delay_ms: u64 =
            std::env::var("PAGE_DELAY_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(250);

        let http_timeout_secs: u64 =
            std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        Ok(Self { source_base_url, source_rps, page_delay_ms, http_timeout_secs })
    }
}
