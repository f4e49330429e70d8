//! RoomFetcher trait and HttpRoomFetcher (blocking HTTP client).

use std::time::Duration;

use reqwest::StatusCode;

use crate::error::FetchError;
use crate::wire::WirePayload;

pub const DEFAULT_ROOMS_URL: &str = "https://rwfc.net/api/roomstatus";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches one room directory payload. Mock-injectable for tests.
pub trait RoomFetcher: Send + Sync {
    fn fetch(&self) -> Result<WirePayload, FetchError>;
}

impl<T: RoomFetcher + ?Sized> RoomFetcher for &T {
    fn fetch(&self) -> Result<WirePayload, FetchError> {
        (**self).fetch()
    }
}

/// Real fetcher using `reqwest::blocking`. Run it off the async runtime.
#[derive(Debug, Clone)]
pub struct HttpRoomFetcher {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpRoomFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rrwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RoomFetcher for HttpRoomFetcher {
    fn fetch(&self) -> Result<WirePayload, FetchError> {
        let resp = self.client.get(&self.url).send()?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text()?;
        Ok(serde_json::from_str(&body)?)
    }
}
