use dotenv::dotenv;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub database_pool_size: u32,
    #[serde(default = "default_port")]
    pub port: u16,
    pub jwt_secret: String,
    #[serde(default = "default_payment_api_base")]
    pub payment_api_base: String,
    pub payment_secret_key: String,
    #[serde(default = "default_currency")]
    pub payment_currency: String,
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

fn default_pool_size() -> u32 {
    10
}

fn default_port() -> u16 {
    8080
}

fn default_payment_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_app_base_url() -> String {
    "http://localhost:5173".to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv().ok(); // Load .env file if present
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Where the hosted checkout sends the guest after paying. The provider
    /// substitutes the session id placeholder.
    pub fn checkout_success_url(&self) -> String {
        format!("{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}", self.app_base_url)
    }

    pub fn checkout_cancel_url(&self, property_id: uuid::Uuid) -> String {
        format!("{}/properties/{}", self.app_base_url, property_id)
    }
}

/// Keeps secrets out of startup logs.
impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "port={} pool_size={} payment_api_base={} currency={} app_base_url={}",
            self.port, self.database_pool_size, self.payment_api_base, self.payment_currency, self.app_base_url
        )
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/test".to_string(),
            database_pool_size: default_pool_size(),
            port: default_port(),
            jwt_secret: "test-secret".to_string(),
            payment_api_base: default_payment_api_base(),
            payment_secret_key: "sk_test".to_string(),
            payment_currency: default_currency(),
            app_base_url: "http://localhost:5173".to_string(),
        }
    }
}
