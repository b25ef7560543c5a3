use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::models::{ComputedEntry, Functional};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaterialsError {
    #[error("Invalid Materials Project API key")]
    Authentication,

    #[error("No materials found for elements {} in Materials Project database", .elements.join(", "))]
    NoEntries { elements: Vec<String> },

    #[error("Materials Project API error: {0}")]
    Api(String),
}

/// Source of computed entries for a chemical system.
#[async_trait]
pub trait MaterialsClient: Send + Sync {
    /// Entries for every compound made of `elements`. A non-zero temperature
    /// asks for Gibbs free-energy corrected entries at that temperature.
    async fn fetch_entries(
        &self,
        api_key: &str,
        elements: &[String],
        temperature: u32,
        functional: Functional,
    ) -> Result<Vec<ComputedEntry>, MaterialsError>;
}

// Body of POST {backend}/entries
#[derive(Debug, Serialize)]
struct EntriesQuery<'a> {
    elements: &'a [String],
    temperature: Option<u32>,
    thermo_types: &'static [&'static str],
}

impl<'a> EntriesQuery<'a> {
    // 0 K means no Gibbs correction, sent as null
    fn new(elements: &'a [String], temperature: u32, functional: Functional) -> Self {
        Self {
            elements,
            temperature: (temperature > 0).then_some(temperature),
            thermo_types: functional.thermo_types(),
        }
    }
}

pub struct HttpMaterialsClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpMaterialsClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }
}

fn is_auth_failure(status: StatusCode, body: &str) -> bool {
    status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || body.contains("Invalid authentication credentials")
}

#[async_trait]
impl MaterialsClient for HttpMaterialsClient {
    async fn fetch_entries(
        &self,
        api_key: &str,
        elements: &[String],
        temperature: u32,
        functional: Functional,
    ) -> Result<Vec<ComputedEntry>, MaterialsError> {
        let query = EntriesQuery::new(elements, temperature, functional);

        tracing::info!(
            "Fetching entries for elements: {:?}, T={}K, functional={}",
            elements,
            temperature,
            functional
        );

        let res = self
            .client
            .post(format!("{}/entries", self.base_url))
            .header("X-API-KEY", api_key)
            .timeout(self.timeout)
            .json(&query)
            .send()
            .await
            .map_err(|e| MaterialsError::Api(format!("Request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            if is_auth_failure(status, &body) {
                return Err(MaterialsError::Authentication);
            }
            return Err(MaterialsError::Api(format!("{} {}", status, body.trim())));
        }

        let entries = res
            .json::<Vec<ComputedEntry>>()
            .await
            .map_err(|e| MaterialsError::Api(format!("Parse Error: {}", e)))?;

        tracing::info!("Retrieved {} entries from Materials Project", entries.len());

        if entries.is_empty() {
            return Err(MaterialsError::NoEntries {
                elements: elements.to_vec(),
            });
        }
        Ok(entries)
    }
}
