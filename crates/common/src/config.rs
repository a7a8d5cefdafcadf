use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub http_host: String,
    pub http_port: u16,
    pub ws_host: String,
    pub ws_port: u16,

    /// AuthBridge credential pair (spec.md §4.8).
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_lifetime_minutes: i64,
    pub refresh_token_lifetime_days: i64,

    /// Token passed to the mail collaborator (email delivery is an external
    /// collaborator per spec.md §1; this core only needs to authenticate to it).
    pub mail_collaborator_token: Option<String>,

    pub allowed_origins: Vec<String>,
    pub max_comment_length: usize,
    pub max_post_description_length: usize,

    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub ip_writes_per_minute: u32,
    pub ip_reads_per_minute: u32,
    pub user_writes_per_minute: u32,
    pub user_reads_per_minute: u32,
    pub auth_attempts_per_hour: u32,
    pub trusted_proxies: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_writes_per_minute: 10,
            ip_reads_per_minute: 60,
            user_writes_per_minute: 20,
            user_reads_per_minute: 120,
            auth_attempts_per_hour: 10,
            trusted_proxies: vec!["127.0.0.1".to_string(), "::1".to_string()],
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from_env()
    }

    pub fn from_env_file(path: &str) -> anyhow::Result<Self> {
        dotenvy::from_filename(path)?;
        Self::load_from_env()
    }

    fn load_from_env() -> anyhow::Result<Self> {
        let rate_limit = RateLimitConfig {
            enabled: env::var("RATE_LIMIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            ip_writes_per_minute: env_parse("RATE_LIMIT_IP_WRITES", 10),
            ip_reads_per_minute: env_parse("RATE_LIMIT_IP_READS", 60),
            user_writes_per_minute: env_parse("RATE_LIMIT_USER_WRITES", 20),
            user_reads_per_minute: env_parse("RATE_LIMIT_USER_READS", 120),
            auth_attempts_per_hour: env_parse("RATE_LIMIT_AUTH_ATTEMPTS", 10),
            trusted_proxies: env::var("TRUSTED_PROXIES")
                .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["127.0.0.1".to_string(), "::1".to_string()]),
        };

        Ok(Config {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            http_port: env_parse("HTTP_PORT", 8080),
            ws_host: env::var("WS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            ws_port: env_parse("WS_PORT", 8081),
            access_token_secret: env::var("ACCESS_TOKEN_SECRET").unwrap_or_else(|_| {
                tracing::warn!("ACCESS_TOKEN_SECRET not set, using random secret (tokens won't persist across restarts)");
                generate_secret()
            }),
            refresh_token_secret: env::var("REFRESH_TOKEN_SECRET").unwrap_or_else(|_| {
                tracing::warn!("REFRESH_TOKEN_SECRET not set, using random secret (tokens won't persist across restarts)");
                generate_secret()
            }),
            access_token_lifetime_minutes: env_parse("ACCESS_TOKEN_LIFETIME_MINUTES", 15),
            refresh_token_lifetime_days: env_parse("REFRESH_TOKEN_LIFETIME_DAYS", 30),
            mail_collaborator_token: env::var("MAIL_COLLABORATOR_TOKEN").ok(),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
                .unwrap_or_default(),
            max_comment_length: env_parse("MAX_COMMENT_LENGTH", 10_000),
            max_post_description_length: env_parse("MAX_POST_DESCRIPTION_LENGTH", 40_000),
            rate_limit,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn generate_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
