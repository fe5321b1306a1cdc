//! Process configuration, read once at startup.

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SHOP_NAME: &str = "Reagent Storefront";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub nats_url: Option<String>,
    pub admin_token: Option<String>,
    pub shop_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            database_url: non_empty("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: match non_empty("PORT") {
                Some(p) => p.parse().with_context(|| format!("PORT is not a valid port: {}", p))?,
                None => DEFAULT_PORT,
            },
            max_connections: match non_empty("DATABASE_MAX_CONNECTIONS") {
                Some(n) => n.parse().with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {}", n))?,
                None => DEFAULT_MAX_CONNECTIONS,
            },
            nats_url: non_empty("NATS_URL"),
            admin_token: non_empty("ADMIN_API_TOKEN"),
            shop_name: non_empty("SHOP_NAME").unwrap_or_else(|| DEFAULT_SHOP_NAME.to_string()),
        })
    }
}
