use super::HttpClient;
use crate::protocol::DriverResult;
use std::time::Duration;

pub struct BookClientBuilder {
    addr: String,
    timeout_ms: Option<u64>,
}

impl BookClientBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            timeout_ms: None,
        }
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout_ms(secs.saturating_mul(1000))
    }

    pub fn build(self) -> DriverResult<HttpClient> {
        match self.timeout_ms {
            Some(ms) => HttpClient::with_timeout(&self.addr, Duration::from_millis(ms)),
            None => HttpClient::new(&self.addr),
        }
    }
}
