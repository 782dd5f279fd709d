//! HTTP time-service adapter.
//!
//! Implements [`TimeFetchPort`] by issuing a plaintext HTTP GET against
//! the configured time service and returning the raw response body.
//! Parsing and gate evaluation happen in the domain core
//! ([`timegate`](crate::timegate)); this adapter only moves bytes.
//!
//! The accumulated body is bounded by `max_body_bytes` — a misbehaving
//! or hostile server cannot exhaust heap by streaming forever.

#[cfg(target_os = "espidf")]
use log::{debug, warn};

use crate::app::ports::{FetchError, TimeFetchPort};

/// Default time service endpoint (plaintext body with a `datetime:` line).
pub const DEFAULT_TIME_URL: &str =
    "http://worldtimeapi.org/api/timezone/America/Los_Angeles.txt";

#[cfg(target_os = "espidf")]
const READ_CHUNK_BYTES: usize = 256;

pub struct HttpTimeAdapter {
    url: String,
    max_body_bytes: usize,
    /// Simulation: next fetch outcome, injected by tests.
    #[cfg(not(target_os = "espidf"))]
    sim_response: Option<Result<String, FetchError>>,
}

impl HttpTimeAdapter {
    pub fn new(url: &str, max_body_bytes: usize) -> Self {
        Self {
            url: url.to_string(),
            max_body_bytes,
            #[cfg(not(target_os = "espidf"))]
            sim_response: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host-side test hook: set the outcome of the next fetch.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_response(&mut self, response: Result<String, FetchError>) {
        self.sim_response = Some(response);
    }

    #[cfg(target_os = "espidf")]
    fn platform_fetch(&mut self) -> Result<String, FetchError> {
        use embedded_svc::http::client::Client as HttpClient;
        use embedded_svc::io::Read;
        use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
        use esp_idf_svc::http::Method;

        let conn = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(core::time::Duration::from_secs(10)),
            ..Default::default()
        })
        .map_err(|_| FetchError::ConnectFailed)?;
        let mut client = HttpClient::wrap(conn);

        let request = client
            .request(Method::Get, &self.url, &[])
            .map_err(|_| FetchError::ConnectFailed)?;
        let mut response = request.submit().map_err(|_| FetchError::ConnectFailed)?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(FetchError::BadStatus(status));
        }

        let mut body = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            let read = response.read(&mut chunk).map_err(|_| FetchError::ReadFailed)?;
            if read == 0 {
                break;
            }
            if body.len() + read > self.max_body_bytes {
                warn!(
                    "time fetch: body exceeds {} byte bound, aborting",
                    self.max_body_bytes
                );
                return Err(FetchError::ResponseTooLarge);
            }
            body.extend_from_slice(&chunk[..read]);
        }

        debug!("time fetch: {} bytes from {}", body.len(), self.url);
        // The parser rejects malformed content; lossy conversion is fine.
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_fetch(&mut self) -> Result<String, FetchError> {
        match self.sim_response.take() {
            Some(outcome) => {
                if let Ok(body) = &outcome {
                    if body.len() > self.max_body_bytes {
                        return Err(FetchError::ResponseTooLarge);
                    }
                }
                outcome
            }
            None => Err(FetchError::NotConnected),
        }
    }
}

impl TimeFetchPort for HttpTimeAdapter {
    fn fetch_body(&mut self) -> Result<String, FetchError> {
        self.platform_fetch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_without_network_fails() {
        let mut adapter = HttpTimeAdapter::new(DEFAULT_TIME_URL, 2048);
        assert_eq!(adapter.fetch_body(), Err(FetchError::NotConnected));
    }

    #[test]
    fn injected_body_passes_through() {
        let mut adapter = HttpTimeAdapter::new(DEFAULT_TIME_URL, 2048);
        adapter.sim_set_response(Ok("datetime: 2024-05-01T23:45:00-07:00\n".to_string()));
        let body = adapter.fetch_body().unwrap();
        assert!(body.contains("datetime:"));
    }

    #[test]
    fn oversize_body_rejected() {
        let mut adapter = HttpTimeAdapter::new(DEFAULT_TIME_URL, 64);
        adapter.sim_set_response(Ok("x".repeat(65)));
        assert_eq!(adapter.fetch_body(), Err(FetchError::ResponseTooLarge));
    }

    #[test]
    fn injected_errors_pass_through() {
        let mut adapter = HttpTimeAdapter::new(DEFAULT_TIME_URL, 2048);
        adapter.sim_set_response(Err(FetchError::BadStatus(503)));
        assert_eq!(adapter.fetch_body(), Err(FetchError::BadStatus(503)));
    }
}
