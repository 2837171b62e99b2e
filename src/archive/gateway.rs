//! HTTP gateway to the image archive.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{CollectionQuery, HistogramRequest, ImageArchive, LandCoverSource, Scene};
use crate::error::{ServiceError, ServiceResult};

const SOURCE: &str = "image archive";

/// Image archive reached over HTTP.
///
/// Exposes `POST {base}/scenes/query` and `POST {base}/landcover/histogram`.
#[derive(Clone)]
pub struct ArchiveGateway {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ScenesResponse {
    scenes: Vec<Scene>,
}

impl ArchiveGateway {
    /// Returns a new gateway
    ///
    /// # Arguments
    ///
    /// * 'base_url' - gateway base URL, without trailing slash
    /// * 'timeout' - timeout applied to every request
    pub fn new(base_url: &str, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: serde::Serialize>(&self, path: &str, body: &T) -> ServiceResult<Value> {
        // ---
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::upstream(SOURCE, format!("{url} returned {status}")));
        }

        let json = resp.text().await?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl ImageArchive for ArchiveGateway {
    fn query_scenes<'a>(
        &'a self,
        query: &'a CollectionQuery,
    ) -> BoxFuture<'a, ServiceResult<Vec<Scene>>> {
        Box::pin(async move {
            let value = self.post_json("/scenes/query", query).await?;
            let resp: ScenesResponse = serde_json::from_value(value)?;
            tracing::debug!(
                "{} returned {} scenes for {}..{}",
                query.collection,
                resp.scenes.len(),
                query.start,
                query.end_exclusive
            );
            Ok(resp.scenes)
        })
    }
}

impl LandCoverSource for ArchiveGateway {
    fn frequency_histogram<'a>(
        &'a self,
        request: &'a HistogramRequest,
    ) -> BoxFuture<'a, ServiceResult<Option<Vec<(String, f64)>>>> {
        Box::pin(async move {
            let value = self.post_json("/landcover/histogram", request).await?;
            parse_histogram(&value, &request.band)
        })
    }
}

/// Extract one band's histogram from a region-reduce result shaped like
/// `{"<band>": {"<class>": <count>, ...}}`.
///
/// A missing or `null` band yields `None`; anything else that is not a map
/// of numeric counts is a malformed payload.
fn parse_histogram(value: &Value, band: &str) -> ServiceResult<Option<Vec<(String, f64)>>> {
    // ---
    let Some(entry) = value.get(band) else {
        return Ok(None);
    };
    if entry.is_null() {
        return Ok(None);
    }
    let Some(classes) = entry.as_object() else {
        return Err(ServiceError::upstream(
            SOURCE,
            format!("histogram for band {band} is not an object"),
        ));
    };

    classes
        .iter()
        .map(|(key, count)| {
            count.as_f64().map(|c| (key.clone(), c)).ok_or_else(|| {
                ServiceError::upstream(SOURCE, format!("non-numeric count for class {key}"))
            })
        })
        .collect::<ServiceResult<Vec<_>>>()
        .map(Some)
}
