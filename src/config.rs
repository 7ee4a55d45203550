use std::str::FromStr;

use anyhow::Context;

/// Server settings, read from the environment (and `.env` through dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub public_url: String,
    pub client_secret_path: String,
    pub session_inactivity_minutes: i64,
    pub initial_balance: i64,
    pub db_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://timebank.db?mode=rwc".to_owned(),
            listen_addr: "0.0.0.0:8080".to_owned(),
            public_url: "http://localhost:8080".to_owned(),
            client_secret_path: "client_secret.json".to_owned(),
            session_inactivity_minutes: 60,
            initial_balance: 30,
            db_max_connections: 16,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let defaults = Config::default();
        Ok(Config {
            database_url: var_or("DATABASE_URL", defaults.database_url),
            listen_addr: var_or("LISTEN_ADDR", defaults.listen_addr),
            public_url: var_or("PUBLIC_URL", defaults.public_url)
                .trim_end_matches('/')
                .to_owned(),
            client_secret_path: var_or("CLIENT_SECRET_PATH", defaults.client_secret_path),
            session_inactivity_minutes: parsed_or(
                "SESSION_INACTIVITY_MINUTES",
                defaults.session_inactivity_minutes,
            )?,
            initial_balance: parsed_or("INITIAL_BALANCE", defaults.initial_balance)?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
        })
    }

    pub fn redirect_url(&self, provider: &str) -> String {
        format!("{}/lockin/{provider}", self.public_url)
    }
}

fn var_or(key: &str, default: String) -> String {
    dotenv::var(key).unwrap_or(default)
}

fn parsed_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is not valid: {raw:?}")),
        Err(_) => Ok(default),
    }
}
