use serde::Deserialize;
use std::env;

const DEFAULT_JWT_TTL_SECONDS: i64 = 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub jwt_ttl_seconds: i64,
    pub bind_addr: String,
    /// JSON file describing an admin account to create at startup
    pub admin_seed_file: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first (two levels up), then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + APP__SECTION__KEY overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "telesoins".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let jwt_ttl_seconds = settings
            .get_int("auth.jwt_ttl_seconds")
            .ok()
            .or_else(|| {
                env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .unwrap_or(DEFAULT_JWT_TTL_SECONDS);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let admin_seed_file = settings
            .get_string("auth.admin_seed_file")
            .or_else(|_| env::var("ADMIN_SEED_FILE"))
            .ok();

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            jwt_ttl_seconds,
            bind_addr,
            admin_seed_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn env_overrides_are_picked_up() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("APP_ENV", "test-config-unit");
        env::set_var("MONGO_DATABASE", "telesoins_unit");
        env::set_var("JWT_ACCESS_TOKEN_TTL_SECONDS", "120");

        let config = Config::load().unwrap();
        assert_eq!(config.mongo_database, "telesoins_unit");
        assert_eq!(config.jwt_ttl_seconds, 120);

        env::remove_var("MONGO_DATABASE");
        env::remove_var("JWT_ACCESS_TOKEN_TTL_SECONDS");
        env::remove_var("APP_ENV");
        env::remove_var("SKIP_ROOT_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn production_requires_jwt_secret() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("APP_ENV", "prod");
        let previous = env::var("JWT_SECRET").ok();
        env::remove_var("JWT_SECRET");

        let result = Config::load();

        env::remove_var("APP_ENV");
        env::remove_var("SKIP_ROOT_ENV");
        if let Some(secret) = previous {
            env::set_var("JWT_SECRET", secret);
        }
        assert!(result.is_err());
    }
}
