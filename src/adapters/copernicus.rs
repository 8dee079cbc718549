use crate::adapters::http::{build_client, download_path, ensure_success, stream_to_file};
use crate::config::toml_config::{CopernicusSection, Credentials};
use crate::domain::model::{Product, Properties, Provider, QueryRequest, SentinelProduct};
use crate::domain::ports::ProviderApi;
use crate::utils::error::{Result, SatflowError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Copernicus Open Access Hub (DHuS)，提供 Sentinel 產品的查詢與下載
pub struct CopernicusApi {
    client: Client,
    api_url: String,
    credentials: Credentials,
    page_size: usize,
}

impl CopernicusApi {
    /// 需要 DHUS_USER 與 DHUS_PASSWORD（或設定檔中的帳密）
    pub fn new(section: &CopernicusSection) -> Result<Self> {
        let credentials = section.credentials()?;
        Ok(Self {
            client: build_client(section.timeout())?,
            api_url: section.api_url.trim_end_matches('/').to_string(),
            credentials,
            page_size: section.page_size.max(1),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&CopernicusSection::default())
    }

    /// OpenSearch 查詢字串，條件以空白串接
    pub fn build_query(request: &QueryRequest) -> String {
        format!(
            "beginPosition:[{}T00:00:00Z TO {}T00:00:00Z] producttype:{} footprint:\"Intersects({})\"",
            request.dates.start.format("%Y-%m-%d"),
            request.dates.end.format("%Y-%m-%d"),
            request.product_type,
            request.bbox.to_wkt_polygon()
        )
    }

    async fn search_page(&self, query: &str, start: usize) -> Result<Value> {
        let url = format!("{}/search", self.api_url);
        tracing::debug!("Copernicus search page start={} rows={}", start, self.page_size);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .query(&[
                ("format", "json".to_string()),
                ("rows", self.page_size.to_string()),
                ("start", start.to_string()),
                ("q", query.to_string()),
            ])
            .send()
            .await?;

        let response = ensure_success(Provider::Copernicus, response).await?;
        Ok(response.json().await?)
    }

    fn product_url(&self, uuid: &str) -> String {
        format!("{}/odata/v1/Products('{}')/$value", self.api_url, uuid)
    }
}

/// 解析一頁 OpenSearch 回應，回傳 (總筆數, 本頁產品)
pub fn parse_search_page(body: &Value) -> Result<(usize, Vec<SentinelProduct>)> {
    let feed = body.get("feed").ok_or_else(|| SatflowError::ProcessingError {
        message: "Copernicus response has no 'feed' element".to_string(),
    })?;

    let total = match feed.get("opensearch:totalResults") {
        Some(Value::String(s)) => s.trim().parse::<usize>().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    };

    // 單筆結果時 entry 是物件而不是陣列
    let entries: Vec<&Value> = match feed.get("entry") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    };

    let products = entries
        .into_iter()
        .map(parse_entry)
        .collect::<Result<Vec<_>>>()?;

    Ok((total, products))
}

fn parse_entry(entry: &Value) -> Result<SentinelProduct> {
    let uuid = entry
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SatflowError::ProcessingError {
            message: "Copernicus entry without 'id'".to_string(),
        })?
        .to_string();
    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(&uuid)
        .to_string();

    let mut properties = Properties::new();
    properties.insert("uuid".to_string(), Value::String(uuid.clone()));
    properties.insert("title".to_string(), Value::String(title.clone()));
    if let Some(summary) = entry.get("summary") {
        properties.insert("summary".to_string(), summary.clone());
    }
    if let Some(href) = entry
        .get("link")
        .and_then(Value::as_array)
        .and_then(|links| links.first())
        .and_then(|link| link.get("href"))
    {
        properties.insert("link".to_string(), href.clone());
    }

    for kind in ["str", "int", "double", "date", "bool"] {
        let items: Vec<&Value> = match entry.get(kind) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(obj @ Value::Object(_)) => vec![obj],
            _ => continue,
        };
        for item in items {
            let (Some(name), Some(content)) = (
                item.get("name").and_then(Value::as_str),
                item.get("content").and_then(Value::as_str),
            ) else {
                continue;
            };
            properties.insert(name.to_string(), typed_content(kind, content));
        }
    }

    Ok(SentinelProduct {
        uuid,
        title,
        properties,
    })
}

fn typed_content(kind: &str, content: &str) -> Value {
    match kind {
        "int" => content
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(content.to_string())),
        "double" => content
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(content.to_string())),
        "bool" => content
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(content.to_string())),
        _ => Value::String(content.to_string()),
    }
}

/// 以 ZIP 讀取器檢查下載的 SAFE 壓縮檔是否完整
pub async fn verify_archive(path: &Path) -> Result<usize> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<usize> {
        let file = std::fs::File::open(&path)?;
        let archive = zip::ZipArchive::new(file)?;
        Ok(archive.len())
    })
    .await
    .map_err(|e| SatflowError::ProcessingError {
        message: format!("Archive verification task failed: {}", e),
    })?
}

#[async_trait]
impl ProviderApi for CopernicusApi {
    fn provider(&self) -> Provider {
        Provider::Copernicus
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<Product>> {
        let query = Self::build_query(request);
        tracing::debug!("Copernicus query: {}", query);

        let mut products = Vec::new();
        loop {
            let body = self.search_page(&query, products.len()).await?;
            let (total, page) = parse_search_page(&body)?;
            if page.is_empty() {
                break;
            }
            products.extend(page.into_iter().map(Product::Sentinel));
            if products.len() >= total {
                break;
            }
        }

        tracing::info!("Sentinel query found {} scenes.", products.len());
        Ok(products)
    }

    async fn download(&self, product: &Product, output_dir: &Path) -> Result<PathBuf> {
        let Product::Sentinel(sentinel) = product else {
            return Err(SatflowError::ProcessingError {
                message: format!(
                    "Copernicus cannot download {} product {}",
                    product.provider(),
                    product.id()
                ),
            });
        };

        tracing::info!("Requested Sentinel product {}", sentinel.title);
        let dest = download_path(output_dir, &sentinel.title, "zip")?;

        if tokio::fs::try_exists(&dest).await? {
            match verify_archive(&dest).await {
                Ok(_) => {
                    tracing::info!("⏭️ {} already downloaded, skipping", dest.display());
                    return Ok(dest);
                }
                Err(e) => {
                    tracing::warn!("Existing {} is not a valid archive ({}), downloading again", dest.display(), e);
                    tokio::fs::remove_file(&dest).await?;
                }
            }
        }

        let response = self
            .client
            .get(self.product_url(&sentinel.uuid))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;
        let response = ensure_success(Provider::Copernicus, response).await?;
        let bytes = stream_to_file(response, &dest).await?;

        if let Err(e) = verify_archive(&dest).await {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(SatflowError::DownloadError {
                product: sentinel.title.clone(),
                reason: format!("downloaded archive is corrupt: {}", e),
            });
        }

        tracing::debug!("Sentinel product {} saved ({} bytes)", sentinel.title, bytes);
        Ok(dest)
    }
}
