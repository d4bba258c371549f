use std::time::Duration;

use log::{error, info};
use reqwest::blocking::Client;

use crate::dataset::Dataset;
use crate::error::EtlError;

/// Where the raw data comes from.  Returns `None` if nothing usable was
/// produced; the reason has already been logged.
pub trait DataSource {
    fn extract(&self) -> Option<Dataset>;
}

/// A csv file served over HTTP.
pub struct HttpSource {
    pub url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration) -> Result<HttpSource, EtlError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpSource {
            url: url.to_string(),
            client,
        })
    }
}

impl DataSource for HttpSource {
    fn extract(&self) -> Option<Dataset> {
        extract_data_from_url(&self.client, &self.url)
    }
}

/// Download the csv at `url` and parse it.  Errors are logged, not returned.
pub fn extract_data_from_url(client: &Client, url: &str) -> Option<Dataset> {
    info!("Attempting to download data from: {}", url);
    match fetch_csv(client, url) {
        Ok(data) => {
            info!(
                "Successfully extracted {} rows x {} columns from URL: {}",
                data.height(),
                data.width(),
                url
            );
            Some(data)
        }
        Err(e @ (EtlError::Http(_) | EtlError::Status { .. })) => {
            error!("Error downloading data from URL: {}", e);
            None
        }
        Err(EtlError::EmptyData) => {
            error!("Error: Empty data received from URL: {}", url);
            None
        }
        Err(e) => {
            error!("An unexpected error occurred during extraction: {}", e);
            None
        }
    }
}

pub fn fetch_csv(client: &Client, url: &str) -> Result<Dataset, EtlError> {
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(EtlError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text()?;
    Dataset::from_csv(&body)
}
