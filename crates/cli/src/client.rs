//! HTTP client for the GitHub releases API

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// The fields of a GitHub release the update check needs
#[derive(Debug, Clone, Deserialize)]
pub struct LatestRelease {
    #[serde(rename = "tag_name")]
    pub version: String,
    #[serde(rename = "html_url")]
    pub url: String,
}

/// Client for the latest-release endpoint
pub struct ReleaseClient {
    client: Client,
    url: String,
}

impl ReleaseClient {
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            // GitHub rejects requests without a user agent
            .user_agent(concat!("kubesleep/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub async fn latest_release(&self) -> Result<LatestRelease, reqwest::Error> {
        self.client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
