use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Database configuration
    pub database_url: String,
    pub database_namespace: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,

    // Authentication configuration
    pub auth_service_url: String,
    pub auth_service_token: String,
    pub jwt_secret: String,

    // Redis configuration
    pub redis_url: Option<String>,
    pub feed_cache_ttl: u64,

    // Web Push (VAPID) configuration
    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<String>,
    pub vapid_subject: String,

    // Alert fanout
    pub fanout_concurrency: usize,
    pub push_send_timeout: u64,
    pub default_alert_radius_km: f64,

    // Boost sweeper
    pub boost_sweep_interval: u64,
    pub boost_sweep_timeout: u64,

    // Frontend URLs
    pub frontend_url: String,

    // Content settings
    pub default_page_size: usize,
    pub max_page_size: usize,

    // Rate limiting
    pub rate_limit_requests: u32,

    // CORS configuration
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "localhost:8000".to_string()),
            database_namespace: env::var("DATABASE_NAMESPACE")
                .unwrap_or_else(|_| "rainbow".to_string()),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "paws".to_string()),
            database_username: env::var("DATABASE_USERNAME")
                .unwrap_or_else(|_| "root".to_string()),
            database_password: env::var("DATABASE_PASSWORD")
                .unwrap_or_else(|_| "root".to_string()),

            auth_service_url: env::var("AUTH_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            auth_service_token: env::var("AUTH_SERVICE_TOKEN")
                .unwrap_or_else(|_| "default-token".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),

            redis_url: env::var("REDIS_URL").ok(),
            // Feed TTL 故意很短: 被提升的内容对时间敏感
            feed_cache_ttl: env::var("FEED_CACHE_TTL")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            vapid_public_key: env::var("VAPID_PUBLIC_KEY").ok(),
            vapid_private_key: env::var("VAPID_PRIVATE_KEY").ok(),
            vapid_subject: env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:admin@rainbow-paws.my".to_string()),

            fanout_concurrency: env::var("FANOUT_CONCURRENCY")
                .unwrap_or_else(|_| "16".to_string())
                .parse()?,
            push_send_timeout: env::var("PUSH_SEND_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            default_alert_radius_km: env::var("DEFAULT_ALERT_RADIUS_KM")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            boost_sweep_interval: env::var("BOOST_SWEEP_INTERVAL")
                .unwrap_or_else(|_| "180".to_string())
                .parse()?,
            boost_sweep_timeout: env::var("BOOST_SWEEP_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),

            default_page_size: env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            max_page_size: env::var("MAX_PAGE_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,

            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            database_url: "localhost:8000".to_string(),
            database_namespace: "rainbow".to_string(),
            database_name: "paws_test".to_string(),
            database_username: "root".to_string(),
            database_password: "root".to_string(),
            auth_service_url: "http://localhost:8080".to_string(),
            auth_service_token: "test-token".to_string(),
            jwt_secret: "test-secret".to_string(),
            redis_url: None,
            feed_cache_ttl: 30,
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: "mailto:admin@rainbow-paws.my".to_string(),
            fanout_concurrency: 4,
            push_send_timeout: 5,
            default_alert_radius_km: 10.0,
            boost_sweep_interval: 180,
            boost_sweep_timeout: 60,
            frontend_url: "http://localhost:3001".to_string(),
            default_page_size: 20,
            max_page_size: 50,
            rate_limit_requests: 100,
            cors_allowed_origins: "http://localhost:3001".to_string(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
