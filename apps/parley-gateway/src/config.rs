/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the directory service that owns communities, channels, and
    /// scheduled events (e.g. `http://localhost:4001`).
    pub directory_url: String,
    /// Shared secret used to verify session tokens minted by the identity
    /// service.
    pub gateway_secret: String,
    /// Port the gateway binds to.
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            directory_url: required_var("DIRECTORY_URL"),
            gateway_secret: required_var("GATEWAY_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4005),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
