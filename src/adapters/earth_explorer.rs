use crate::adapters::http::{build_client, download_path, ensure_success, stream_to_file};
use crate::config::toml_config::{Credentials, EarthExplorerSection};
use crate::domain::model::{LandsatScene, Product, Properties, Provider, QueryRequest};
use crate::domain::ports::ProviderApi;
use crate::utils::error::{Result, SatflowError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const AUTH_HEADER: &str = "X-Auth-Token";
const DOWNLOAD_LABEL: &str = "satflow";

/// USGS EarthExplorer 的 M2M JSON API，用於 Landsat 影像
///
/// 每次查詢或下載都會登入取得 API key，完成後登出。
pub struct EarthExplorerApi {
    client: Client,
    api_url: String,
    credentials: Credentials,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct M2mResponse {
    #[serde(default)]
    data: Value,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadOption {
    id: Value,
    entity_id: Option<String>,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequestResult {
    #[serde(default)]
    available_downloads: Vec<AvailableDownload>,
    #[serde(default)]
    preparing_downloads: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AvailableDownload {
    url: String,
}

impl EarthExplorerApi {
    /// 需要 LANDSATXPLORE_USERNAME 與 LANDSATXPLORE_PASSWORD（或設定檔中的帳密）
    pub fn new(section: &EarthExplorerSection) -> Result<Self> {
        let credentials = section.credentials()?;
        Ok(Self {
            client: build_client(section.timeout())?,
            api_url: section.api_url.trim_end_matches('/').to_string(),
            credentials,
            max_results: section.max_results.max(1),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&EarthExplorerSection::default())
    }

    async fn call(&self, endpoint: &str, api_key: Option<&str>, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.api_url, endpoint);
        tracing::debug!("M2M request: {}", endpoint);

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = api_key {
            request = request.header(AUTH_HEADER, key);
        }

        let response = ensure_success(Provider::EarthExplorer, request.send().await?).await?;
        let payload: M2mResponse = response.json().await?;

        if let Some(code) = payload.error_code {
            return Err(SatflowError::ApiError {
                provider: Provider::EarthExplorer.to_string(),
                code,
                message: payload.error_message.unwrap_or_default(),
            });
        }
        Ok(payload.data)
    }

    async fn login(&self) -> Result<String> {
        let data = self
            .call(
                "login",
                None,
                &json!({
                    "username": self.credentials.username,
                    "password": self.credentials.password,
                }),
            )
            .await?;

        data.as_str()
            .map(str::to_string)
            .ok_or_else(|| SatflowError::ProcessingError {
                message: "EarthExplorer login did not return an API key".to_string(),
            })
    }

    async fn logout(&self, api_key: &str) {
        if let Err(e) = self.call("logout", Some(api_key), &Value::Null).await {
            tracing::warn!("EarthExplorer logout failed: {}", e);
        }
    }

    pub fn build_search_body(&self, request: &QueryRequest) -> Value {
        json!({
            "datasetName": request.product_type.as_str(),
            "maxResults": self.max_results,
            "sceneFilter": {
                "spatialFilter": {
                    "filterType": "mbr",
                    "lowerLeft": {
                        "latitude": request.bbox.min_lat,
                        "longitude": request.bbox.min_lon,
                    },
                    "upperRight": {
                        "latitude": request.bbox.max_lat,
                        "longitude": request.bbox.max_lon,
                    },
                },
                "acquisitionFilter": {
                    "start": request.dates.start.format("%Y-%m-%d").to_string(),
                    "end": request.dates.end.format("%Y-%m-%d").to_string(),
                },
            },
        })
    }

    async fn search(&self, api_key: &str, request: &QueryRequest) -> Result<Vec<Product>> {
        let data = self
            .call("scene-search", Some(api_key), &self.build_search_body(request))
            .await?;
        parse_scenes(&data, request.product_type.as_str())
    }

    async fn fetch(&self, api_key: &str, scene: &LandsatScene, dataset: &str, dest: &Path) -> Result<u64> {
        let options = self
            .call(
                "download-options",
                Some(api_key),
                &json!({ "datasetName": dataset, "entityIds": [scene.entity_id] }),
            )
            .await?;
        let options: Vec<DownloadOption> = serde_json::from_value(options)?;

        let option = options
            .into_iter()
            .filter(|o| o.entity_id.as_deref().map_or(true, |id| id == scene.entity_id))
            .find(|o| o.available)
            .ok_or_else(|| SatflowError::DownloadError {
                product: scene.entity_id.clone(),
                reason: "no downloadable product available".to_string(),
            })?;

        let requested = self
            .call(
                "download-request",
                Some(api_key),
                &json!({
                    "downloads": [{ "entityId": scene.entity_id, "productId": option.id }],
                    "label": DOWNLOAD_LABEL,
                }),
            )
            .await?;
        let requested: DownloadRequestResult = serde_json::from_value(requested)?;

        let Some(available) = requested.available_downloads.first() else {
            let reason = if requested.preparing_downloads.is_empty() {
                "download request returned no URL".to_string()
            } else {
                "download is still being prepared by USGS".to_string()
            };
            return Err(SatflowError::DownloadError {
                product: scene.entity_id.clone(),
                reason,
            });
        };

        let response = self.client.get(&available.url).send().await?;
        let response = ensure_success(Provider::EarthExplorer, response).await?;
        stream_to_file(response, dest).await
    }
}

/// `scene-search` 的 data 區段轉成 Landsat 場景
pub fn parse_scenes(data: &Value, dataset: &str) -> Result<Vec<Product>> {
    let results = match data.get("results") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(SatflowError::ProcessingError {
                message: format!("Unexpected scene-search results: {}", other),
            })
        }
    };

    results
        .iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| SatflowError::ProcessingError {
                message: "scene-search result is not an object".to_string(),
            })?;

            let mut properties: Properties = obj
                .iter()
                .map(|(k, v)| (to_snake_case(k), v.clone()))
                .collect();
            if let Some(start) = obj
                .get("temporalCoverage")
                .and_then(|t| t.get("startDate"))
            {
                properties.insert("acquisition_date".to_string(), start.clone());
            }
            properties.insert("dataset_name".to_string(), Value::String(dataset.to_string()));

            let entity_id = properties
                .get("entity_id")
                .and_then(Value::as_str)
                .ok_or_else(|| SatflowError::ProcessingError {
                    message: "scene-search result without entityId".to_string(),
                })?
                .to_string();
            let display_id = properties
                .get("display_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            Ok(Product::Landsat(LandsatScene {
                entity_id,
                display_id,
                properties,
            }))
        })
        .collect()
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[async_trait]
impl ProviderApi for EarthExplorerApi {
    fn provider(&self) -> Provider {
        Provider::EarthExplorer
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<Product>> {
        let api_key = self.login().await?;
        let result = self.search(&api_key, request).await;
        self.logout(&api_key).await;

        let products = result?;
        tracing::info!("Landsat query found {} products.", products.len());
        Ok(products)
    }

    async fn download(&self, product: &Product, output_dir: &Path) -> Result<PathBuf> {
        let Product::Landsat(scene) = product else {
            return Err(SatflowError::ProcessingError {
                message: format!(
                    "EarthExplorer cannot download {} product {}",
                    product.provider(),
                    product.id()
                ),
            });
        };

        tracing::info!("Requested Landsat product {}", scene.entity_id);
        let dest = download_path(output_dir, product.title(), "tar.gz")?;
        if tokio::fs::try_exists(&dest).await? {
            tracing::info!("⏭️ {} already downloaded, skipping", dest.display());
            return Ok(dest);
        }

        let dataset = scene
            .properties
            .get("dataset_name")
            .and_then(Value::as_str)
            .unwrap_or("landsat_8_c1")
            .to_string();

        let api_key = self.login().await?;
        let result = self.fetch(&api_key, scene, &dataset, &dest).await;
        self.logout(&api_key).await;

        let bytes = result?;
        tracing::debug!("Landsat product {} saved ({} bytes)", scene.entity_id, bytes);
        Ok(dest)
    }
}
