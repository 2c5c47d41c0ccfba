use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::geo::{haversine_distance, normalize_longitude};

pub const MAX_RESULTS_PER_PAGE: u8 = 20;
const HTTP_TIMEOUT_SECS: u64 = 10;
const FIELD_MASK: &str = "places.displayName,\
places.formattedAddress,\
places.rating,\
places.userRatingCount,\
places.location,\
places.plusCode,\
places.id,\
nextPageToken";

/// One user-initiated search. Longitude is normalized on construction.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub min_reviews: u64,
}

impl SearchRequest {
    pub fn new(
        query: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
        min_reviews: u64,
    ) -> AppResult<Self> {
        if radius_meters <= 0.0 {
            return Err(AppError::Config(format!(
                "search radius must be positive, got {radius_meters}"
            )));
        }
        Ok(Self {
            query: query.into(),
            latitude,
            longitude: normalize_longitude(longitude),
            radius_meters,
            min_reviews,
        })
    }
}

/// A place as the provider returns it. Field names mirror the wire shape so
/// persisted sessions stay readable as plain API objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<LocalizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_rating_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plus_code: Option<PlusCode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedText {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlusCode {
    #[serde(default)]
    pub global_code: Option<String>,
}

impl PlaceRecord {
    pub fn name(&self) -> &str {
        self.display_name
            .as_ref()
            .and_then(|text| text.text.as_deref())
            .unwrap_or("")
    }

    /// Both coordinates, or nothing. A half-present location cannot be
    /// distance-checked and counts as unresolvable.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let location = self.location.as_ref()?;
        Some((location.latitude?, location.longitude?))
    }

    pub fn plus_code_value(&self) -> Option<&str> {
        self.plus_code.as_ref().and_then(|code| code.global_code.as_deref())
    }
}

/// Both orderings of one completed search. `original_order` is the provider's
/// arrival order (min-review filter only); `ranked_order` is distance-filtered
/// and sorted by review count then rating.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub original_order: Vec<PlaceRecord>,
    pub ranked_order: Vec<PlaceRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchBody {
    pub text_query: String,
    pub location_bias: LocationBias,
    pub max_result_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationBias {
    pub circle: BiasCircle,
}

#[derive(Debug, Clone, Serialize)]
pub struct BiasCircle {
    pub center: BiasCenter,
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BiasCenter {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub places: Vec<PlaceRecord>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One page of the provider's text search. The pipeline owns pagination;
/// implementations only move a single request/response pair.
#[async_trait]
pub trait PlacesSearchClient: Send + Sync {
    async fn search_page(
        &self,
        body: &TextSearchBody,
        api_key: &SecretString,
    ) -> AppResult<SearchPage>;
}

pub struct HttpSearchClient {
    http: Client,
    endpoint: String,
}

impl HttpSearchClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("search-maps/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.places_search_endpoint.clone(),
        })
    }
}

#[async_trait]
impl PlacesSearchClient for HttpSearchClient {
    async fn search_page(
        &self,
        body: &TextSearchBody,
        api_key: &SecretString,
    ) -> AppResult<SearchPage> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", api_key.expose_secret())
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(AppError::from)
    }
}

pub struct PlaceSearchPipeline {
    client: Arc<dyn PlacesSearchClient>,
    page_delay: Duration,
}

impl PlaceSearchPipeline {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            client: Arc::new(HttpSearchClient::new(config)?),
            page_delay: Duration::from_millis(config.places_page_delay_ms),
        })
    }

    pub fn from_client(client: Arc<dyn PlacesSearchClient>, page_delay: Duration) -> Self {
        Self { client, page_delay }
    }

    /// Runs the full paginated search. Fails on the first non-success page
    /// with no partial results; an in-flight search cannot be cancelled.
    pub async fn execute(
        &self,
        request: &SearchRequest,
        api_key: &SecretString,
    ) -> AppResult<SearchResult> {
        let mut body = TextSearchBody {
            text_query: request.query.clone(),
            location_bias: LocationBias {
                circle: BiasCircle {
                    center: BiasCenter {
                        latitude: request.latitude,
                        longitude: request.longitude,
                    },
                    radius: request.radius_meters,
                },
            },
            max_result_count: MAX_RESULTS_PER_PAGE,
            page_token: None,
        };

        let mut original_order: Vec<PlaceRecord> = Vec::new();
        let mut pages = 0_usize;
        loop {
            let page = self.client.search_page(&body, api_key).await?;
            pages += 1;

            original_order.extend(
                page.places
                    .into_iter()
                    .filter(|place| place.user_rating_count >= request.min_reviews),
            );

            match page.next_page_token {
                Some(token) => {
                    // The provider invalidates a page token used before its
                    // cooldown has elapsed.
                    sleep(self.page_delay).await;
                    body.page_token = Some(token);
                }
                None => break,
            }
        }

        debug!(pages, fetched = original_order.len(), "search pagination complete");

        let ranked_order = rank_places(&original_order, request);
        Ok(SearchResult {
            original_order,
            ranked_order,
        })
    }
}

/// Distance-filters and sorts a copy of the arrival-order records. Places
/// without resolvable coordinates are dropped: an unknown location means an
/// unknown distance. The sort is stable, so ties keep arrival order.
pub fn rank_places(original_order: &[PlaceRecord], request: &SearchRequest) -> Vec<PlaceRecord> {
    let mut ranked: Vec<PlaceRecord> = original_order
        .iter()
        .filter(|place| {
            place.coordinates().is_some_and(|(lat, lon)| {
                haversine_distance(request.latitude, request.longitude, lat, lon)
                    <= request.radius_meters
            })
        })
        .cloned()
        .collect();

    ranked.sort_by(|a, b| {
        b.user_rating_count
            .cmp(&a.user_rating_count)
            .then_with(|| {
                b.rating
                    .unwrap_or(0.0)
                    .total_cmp(&a.rating.unwrap_or(0.0))
            })
    });
    ranked
}
