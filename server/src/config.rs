use anyhow::{Result, anyhow, bail};
use products_crm::{DEALS_TABLE, SyncStrategy, TeamRoster};

/// Which store holds the deals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DealsBackend {
    Rest,
    Database,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestSettings {
    pub url: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: DealsBackend,
    pub rest: Option<RestSettings>,
    pub table: String,
    pub sync: SyncStrategy,
    pub team: TeamRoster,
    pub dev_login: Option<(String, String)>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var("DEALS_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("rest") => DealsBackend::Rest,
            Some("database") | Some("db") => DealsBackend::Database,
            Some("memory") => DealsBackend::Memory,
            Some(other) => bail!("unknown DEALS_BACKEND `{other}` (use rest|database|memory)"),
        };

        let rest = match (var("GATEWAY_URL"), var("GATEWAY_API_KEY")) {
            (Some(url), Some(api_key)) => Some(RestSettings { url, api_key }),
            (Some(_), None) => bail!("GATEWAY_API_KEY missing"),
            (None, Some(_)) => bail!("GATEWAY_URL missing"),
            (None, None) => None,
        };
        if backend == DealsBackend::Rest && rest.is_none() {
            return Err(anyhow!("DEALS_BACKEND=rest requires GATEWAY_URL and GATEWAY_API_KEY"));
        }

        let sync = match var("BOARD_SYNC").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("optimistic") => SyncStrategy::Optimistic,
            Some("refetch") => SyncStrategy::Refetch,
            Some(other) => bail!("unknown BOARD_SYNC `{other}` (use optimistic|refetch)"),
        };

        let team = var("TEAM_MEMBERS")
            .map(|list| TeamRoster::new(list.split(',')))
            .unwrap_or_default();

        let dev_login = match (var("DEV_LOGIN_EMAIL"), get("DEV_LOGIN_PASSWORD")) {
            (Some(email), Some(password)) if !password.is_empty() => Some((email, password)),
            (Some(_), _) => bail!("DEV_LOGIN_PASSWORD missing"),
            _ => None,
        };
        if rest.is_none() && dev_login.is_none() {
            return Err(anyhow!(
                "no auth backend configured: set GATEWAY_URL/GATEWAY_API_KEY or DEV_LOGIN_EMAIL/DEV_LOGIN_PASSWORD"
            ));
        }

        Ok(Self {
            backend,
            rest,
            table: var("DEALS_TABLE").unwrap_or_else(|| DEALS_TABLE.to_string()),
            sync,
            team,
            dev_login,
        })
    }
}
