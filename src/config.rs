use std::env;
use std::time::Duration;

pub const DEFAULT_MUFAP_NAV_URL: &str = "https://www.mufap.com.pk/Industry/IndustryStatDaily?tab=3";
pub const DEFAULT_PSX_MARKET_WATCH_URL: &str = "https://dps.psx.com.pk/market-watch";
pub const DEFAULT_PSX_HOME_URL: &str = "https://dps.psx.com.pk";

/// HTTP behaviour shared by every fetch.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: Duration::from_millis(500),
            pool_max_idle_per_host: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scrape_interval: Duration,
    pub excel_output_dir: String,
    pub export_on_publish: bool,
    pub mufap_nav_url: String,
    pub psx_market_watch_url: String,
    pub psx_home_url: String,
    pub http: HttpConfig,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            scrape_interval: Duration::from_secs(30 * 60),
            excel_output_dir: "output".to_string(),
            export_on_publish: true,
            mufap_nav_url: DEFAULT_MUFAP_NAV_URL.to_string(),
            psx_market_watch_url: DEFAULT_PSX_MARKET_WATCH_URL.to_string(),
            psx_home_url: DEFAULT_PSX_HOME_URL.to_string(),
            http: HttpConfig::default(),
            port: 8000,
        }
    }

    /// Defaults overridden by the process environment (and `.env`, when present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::new();

        if let Some(minutes) = env_parse::<u64>("SCRAPE_INTERVAL_MINUTES") {
            config = config.with_scrape_interval_minutes(minutes);
        }
        if let Ok(dir) = env::var("EXCEL_OUTPUT_DIR") {
            config = config.with_excel_output_dir(&dir);
        }
        if let Ok(url) = env::var("MUFAP_NAV_URL") {
            config.mufap_nav_url = url;
        }
        if let Ok(url) = env::var("PSX_MARKET_WATCH_URL") {
            config.psx_market_watch_url = url;
        }
        if let Ok(url) = env::var("PSX_HOME_URL") {
            config.psx_home_url = url;
        }
        if let Some(secs) = env_parse::<u64>("HTTP_TIMEOUT_SECS") {
            config.http.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("HTTP_MAX_RETRIES") {
            config.http.max_retries = retries;
        }
        if let Some(millis) = env_parse::<u64>("HTTP_BACKOFF_MILLIS") {
            config.http.backoff = Duration::from_millis(millis);
        }
        if let Some(port) = env_parse::<u16>("PORT") {
            config = config.with_port(port);
        }

        config
    }

    pub fn with_scrape_interval_minutes(mut self, minutes: u64) -> Self {
        // a zero interval would spin the scheduler
        self.scrape_interval = Duration::from_secs(minutes.max(1) * 60);
        self
    }

    pub fn with_excel_output_dir(mut self, dir: &str) -> Self {
        self.excel_output_dir = dir.to_string();
        self
    }

    pub fn with_export_on_publish(mut self, enabled: bool) -> Self {
        self.export_on_publish = enabled;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.http.max_retries = retries;
        self
    }

    pub fn scrape_interval_minutes(&self) -> u64 {
        self.scrape_interval.as_secs() / 60
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                None
            }
        },
        Err(_) => None,
    }
}
