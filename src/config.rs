// Global engine constants - single source of truth

pub struct Config;

impl Config {
    // Retry/backoff after a rate-limit signal
    pub const INIT_SLEEP_MS: u64 = 150;
    pub const BACKOFF_FACTOR: f64 = 1.5;
    pub const MAX_TRIES: u32 = 3;

    // Optional fixed delay after each successful request
    pub const THROTTLE_MS: u64 = 0;

    // Seconds before the invocation deadline at which scanning stops
    pub const TIMEOUT_BUFFER_SECS: u64 = 120;

    // Accounts dispatched per invocation
    pub const ACCOUNT_BATCH_SIZE: usize = 50;

    // Entities retrieved per backend page
    pub const PAGE_SIZE: usize = 10_000;

    // Account selection window once the cycle marker exists
    pub const COST_WINDOW_DAYS: i64 = 30;

    // HTTP client
    pub const REQUEST_TIMEOUT_SECS: u64 = 20;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const MAX_REDIRECTS: usize = 5;

    // Name of the durable checkpoint marker
    pub const MARKER_NAME: &'static str = "linkaudit_complete";
}
