use serde::Deserialize;

/// Process configuration, loaded entirely from the environment (§6:
/// "database connection string via environment (one variable for
/// production, one for tests)").
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Production database connection string.
    pub database_url: String,
    /// Test database connection string, used by `#[sqlx::test]` harnesses.
    #[serde(default)]
    pub test_database_url: Option<String>,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env::<Config>()
    }
}
