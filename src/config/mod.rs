use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub sms: SmsConfig,
    pub otp: OtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub default_per_page: i64,
    pub max_per_page: i64,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Key material for the identifier token codec. Rotating it invalidates
    /// every token previously handed to clients.
    pub token_key: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub temp_password_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub api_key: String,
    pub sender_name: String,
    /// When false the gateway is skipped and messages are only logged.
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    pub ttl_secs: i64,
    pub max_attempts: i32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }

        if let Ok(v) = env::var("API_DEFAULT_PER_PAGE") {
            self.api.default_per_page = v.parse().unwrap_or(self.api.default_per_page);
        }
        if let Ok(v) = env::var("API_MAX_PER_PAGE") {
            self.api.max_per_page = v.parse().unwrap_or(self.api.max_per_page);
        }
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }

        // Secrets only ever come from the environment
        if let Ok(v) = env::var("CPMS_TOKEN_KEY") {
            self.security.token_key = v;
        }
        if let Ok(v) = env::var("CPMS_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("CPMS_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        if let Ok(v) = env::var("SEMAPHORE_API_KEY") {
            self.sms.api_key = v;
            self.sms.enabled = true;
        }
        if let Ok(v) = env::var("SEMAPHORE_SENDER_NAME") {
            self.sms.sender_name = v;
        }

        if let Ok(v) = env::var("OTP_TTL_SECS") {
            self.otp.ttl_secs = v.parse().unwrap_or(self.otp.ttl_secs);
        }
        if let Ok(v) = env::var("OTP_MAX_ATTEMPTS") {
            self.otp.max_attempts = v.parse().unwrap_or(self.otp.max_attempts);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_secs: 30,
            },
            api: ApiConfig {
                default_per_page: 10,
                max_per_page: 100,
                enable_cors: true,
            },
            security: SecurityConfig {
                token_key: "cpms-development-token-key".to_string(),
                jwt_secret: "cpms-development-jwt-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                temp_password_length: 10,
            },
            sms: SmsConfig {
                api_key: String::new(),
                sender_name: "CPMSTubod".to_string(),
                enabled: false,
            },
            otp: OtpConfig {
                ttl_secs: 300, // 5 minutes
                max_attempts: 5,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_secs: 10,
            },
            security: SecurityConfig {
                jwt_expiry_hours: 24,
                ..Self::development().security
            },
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_secs: 5,
            },
            api: ApiConfig {
                default_per_page: 10,
                max_per_page: 50,
                enable_cors: false,
            },
            security: SecurityConfig {
                jwt_expiry_hours: 8,
                ..Self::development().security
            },
            ..Self::development()
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults() {
        let config = AppConfig::development();
        assert_eq!(config.api.default_per_page, 10);
        assert_eq!(config.otp.ttl_secs, 300);
        assert_eq!(config.otp.max_attempts, 5);
        assert!(!config.sms.enabled);
    }

    #[test]
    fn production_tightens_limits() {
        let config = AppConfig::production();
        assert_eq!(config.api.max_per_page, 50);
        assert_eq!(config.security.jwt_expiry_hours, 8);
        assert!(!config.api.enable_cors);
    }

    #[test]
    fn staging_shortens_jwt_expiry() {
        let config = AppConfig::staging();
        assert_eq!(config.security.jwt_expiry_hours, 24);
        assert_eq!(config.database.max_connections, 20);
    }
}
