use anyhow::{anyhow, Context, Result};
use std::env;
use std::fmt;
use std::net::IpAddr;

/// Marker carried by the placeholder credentials shipped in sample env files.
pub const PLACEHOLDER_MARKER: &str = "XXXX";

const SANDBOX_SNAP_BASE_URL: &str = "https://app.sandbox.midtrans.com/snap/v1";
const PRODUCTION_SNAP_BASE_URL: &str = "https://app.midtrans.com/snap/v1";
const SANDBOX_API_BASE_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_API_BASE_URL: &str = "https://api.midtrans.com";

const DEFAULT_SERVER_KEY: &str = "Mid-server-XXXX";
const DEFAULT_CLIENT_KEY: &str = "Mid-client-XXXX";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:8080";
const DEFAULT_EMAIL: &str = "customer@example.com";
const DEFAULT_PHONE: &str = "081234567890";
const DEFAULT_ORIGINS: &[&str] = &["http://localhost:8080", "http://127.0.0.1:5500"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Sandbox,
    Production,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Sandbox => "sandbox",
            GatewayMode::Production => "production",
        }
    }
}

#[derive(Clone)]
pub struct MidtransConfig {
    pub mode: GatewayMode,
    pub server_key: String,
    pub client_key: String,
    pub snap_base_url: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
    pub verify_signature: bool,
}

impl MidtransConfig {
    pub fn new(mode: GatewayMode, server_key: impl Into<String>, client_key: impl Into<String>) -> Self {
        let (snap_base_url, api_base_url) = match mode {
            GatewayMode::Sandbox => (SANDBOX_SNAP_BASE_URL, SANDBOX_API_BASE_URL),
            GatewayMode::Production => (PRODUCTION_SNAP_BASE_URL, PRODUCTION_API_BASE_URL),
        };
        Self {
            mode,
            server_key: server_key.into(),
            client_key: client_key.into(),
            snap_base_url: snap_base_url.to_string(),
            api_base_url: api_base_url.to_string(),
            timeout_secs: 30,
            verify_signature: true,
        }
    }

    /// Points both APIs at another host, e.g. a local mock gateway.
    pub fn with_base_urls(mut self, snap_base_url: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        self.snap_base_url = snap_base_url.into();
        self.api_base_url = api_base_url.into();
        self
    }

    /// True when both keys are set and neither is the shipped placeholder.
    pub fn is_configured(&self) -> bool {
        is_real_key(&self.server_key) && is_real_key(&self.client_key)
    }

    pub fn masked_server_key(&self) -> String {
        mask(&self.server_key)
    }

    pub fn masked_client_key(&self) -> String {
        mask(&self.client_key)
    }
}

// Keys never reach logs through Debug.
impl fmt::Debug for MidtransConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidtransConfig")
            .field("mode", &self.mode)
            .field("server_key", &self.masked_server_key())
            .field("client_key", &self.masked_client_key())
            .field("snap_base_url", &self.snap_base_url)
            .field("api_base_url", &self.api_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("verify_signature", &self.verify_signature)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub host: IpAddr,
    pub port: u16,
    pub midtrans: MidtransConfig,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
    pub default_email: String,
    pub default_phone: String,
    pub database_url: Option<String>,
}

impl CheckoutConfig {
    /// Config with every optional setting at its default, for the given gateway credentials.
    pub fn with_gateway(midtrans: MidtransConfig) -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 4000,
            midtrans,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            allowed_origins: DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
            default_email: DEFAULT_EMAIL.to_string(),
            default_phone: DEFAULT_PHONE.to_string(),
            database_url: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

        let host: IpAddr = var("HOST")
            .unwrap_or_else(|| "0.0.0.0".to_string())
            .parse()
            .context("HOST must be an IP address")?;
        let port = match var("PORT") {
            Some(value) => value.parse::<u16>().context("PORT must be a valid port number")?,
            None => 4000,
        };

        let mode = if var("MIDTRANS_IS_PRODUCTION").map(|v| parse_bool(&v)).unwrap_or(false) {
            GatewayMode::Production
        } else {
            GatewayMode::Sandbox
        };
        let server_key = var("MIDTRANS_SERVER_KEY").unwrap_or_else(|| DEFAULT_SERVER_KEY.to_string());
        let client_key = var("MIDTRANS_CLIENT_KEY").unwrap_or_else(|| DEFAULT_CLIENT_KEY.to_string());
        let mut midtrans = MidtransConfig::new(mode, server_key, client_key);
        if let Some(url) = var("MIDTRANS_SNAP_BASE_URL") {
            midtrans.snap_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = var("MIDTRANS_API_BASE_URL") {
            midtrans.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(value) = var("MIDTRANS_TIMEOUT_SECONDS") {
            let secs = value
                .parse::<u64>()
                .context("MIDTRANS_TIMEOUT_SECONDS must be a whole number of seconds")?;
            midtrans.timeout_secs = secs.max(1);
        }
        if let Some(value) = var("MIDTRANS_VERIFY_SIGNATURE") {
            midtrans.verify_signature = parse_bool(&value);
        }

        let frontend_url = var("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());
        let allowed_origins = match var("CORS_ALLOWED_ORIGINS") {
            Some(value) => parse_origins(&value)?,
            None => DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };
        let default_email = var("CHECKOUT_DEFAULT_EMAIL").unwrap_or_else(|| DEFAULT_EMAIL.to_string());
        let default_phone = var("CHECKOUT_DEFAULT_PHONE").unwrap_or_else(|| DEFAULT_PHONE.to_string());
        let database_url = var("DATABASE_URL");

        Ok(Self {
            host,
            port,
            midtrans,
            frontend_url,
            allowed_origins,
            default_email,
            default_phone,
            database_url,
        })
    }
}

fn is_real_key(key: &str) -> bool {
    !key.trim().is_empty() && !key.contains(PLACEHOLDER_MARKER)
}

fn mask(key: &str) -> String {
    let prefix: String = key.chars().take(20).collect();
    format!("{prefix}...")
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_origins(value: &str) -> Result<Vec<String>> {
    let origins: Vec<String> = value
        .split(|c| c == ',' || c == ';' || c == ' ')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.trim_end_matches('/').to_string())
        .collect();
    if origins.is_empty() {
        return Err(anyhow!("CORS_ALLOWED_ORIGINS is set but lists no origins"));
    }
    Ok(origins)
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
