use std::time::Duration;

/// Listener and request limits of the HTTP front end.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    /// 0 lets the OS pick a port.
    pub port: u16,
    /// Upper bound on handling one request.
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8140,
            request_timeout: Duration::from_secs(60),
            max_body_bytes: 16 * 1024 * 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpConfig {
    /// Loopback listener on an OS-assigned port.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }
}
