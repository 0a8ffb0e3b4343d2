use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::anyhow;
use evlog::meta;

use crate::runtime::get_logger;

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub chain_rpc_url: String,
    pub auth_header: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("POLLS_PORT", "8000")?,
            database_url: try_load("POLLS_DATABASE_URL", "sqlite://polls.db?mode=rwc")?,
            database_max_connections: try_load("POLLS_DATABASE_MAX_CONNECTIONS", "5")?,
            chain_rpc_url: try_load("POLLS_CHAIN_RPC_URL", "http://127.0.0.1:8545")?,
            auth_header: try_load("POLLS_AUTH_HEADER", "x-remote-user")?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = match env::var(key) {
        Ok(v) => v,
        Err(_) => {
            get_logger().info("Environment variable not set; using default.", meta! {
                "Key" => key,
                "Default" => default,
            });
            default.to_owned()
        }
    };

    raw.parse::<T>()
        .map_err(|e| anyhow!("invalid value for {}: {}", key, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_falls_back_to_default() {
        let port: u16 = try_load("POLLS_TEST_UNSET_PORT", "8123").unwrap();
        assert_eq!(port, 8123);
    }

    #[test]
    fn malformed_default_is_reported_with_its_key() {
        let err = try_load::<u16>("POLLS_TEST_UNSET_PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("POLLS_TEST_UNSET_PORT"));
    }
}
