use anyhow::Result;
use httpmock::prelude::*;
use satflow::config::toml_config::CopernicusSection;
use satflow::domain::model::{DateRange, Product, ProductType, QueryRequest, SentinelProduct};
use satflow::domain::ports::ProviderApi;
use satflow::CopernicusApi;
use satflow::SatflowError;
use std::io::Write;
use tempfile::TempDir;
use zip::write::{FileOptions, ZipWriter};

// "user:pass" 的 Basic auth
const BASIC_AUTH: &str = "Basic dXNlcjpwYXNz";

fn section(server: &MockServer, page_size: usize) -> CopernicusSection {
    CopernicusSection {
        api_url: server.base_url(),
        username: Some("user".to_string()),
        password: Some("pass".to_string()),
        page_size,
        timeout_seconds: 5,
        ..CopernicusSection::default()
    }
}

fn request() -> QueryRequest {
    QueryRequest {
        product_type: ProductType::S2Msi1c,
        bbox: "23.5,37.7,24,38.2".parse().unwrap(),
        dates: DateRange::parse("20210112", "20210114").unwrap(),
    }
}

fn entry(uuid: &str) -> serde_json::Value {
    serde_json::json!({
        "id": uuid,
        "title": format!("S2A_MSIL1C_{}", uuid),
        "double": {"name": "cloudcoverpercentage", "content": "4.2"},
        "str": [{"name": "producttype", "content": "S2MSI1C"}]
    })
}

fn sentinel(uuid: &str) -> Product {
    Product::Sentinel(SentinelProduct {
        uuid: uuid.to_string(),
        title: format!("S2A_MSIL1C_{}", uuid),
        properties: Default::default(),
    })
}

fn zip_bytes() -> Vec<u8> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file::<_, ()>("MTD_MSIL1C.xml", FileOptions::default())
        .unwrap();
    zip.write_all(b"<metadata/>").unwrap();
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_query_pages_through_all_results() -> Result<()> {
    let server = MockServer::start();

    let first_page = server.mock(|when, then| {
        when.method(GET)
            .path("/search")
            .header("Authorization", BASIC_AUTH)
            .query_param("format", "json")
            .query_param("rows", "2")
            .query_param("start", "0")
            .query_param_exists("q");
        then.status(200).json_body(serde_json::json!({
            "feed": {
                "opensearch:totalResults": "3",
                "entry": [entry("uuid-1"), entry("uuid-2")]
            }
        }));
    });
    let second_page = server.mock(|when, then| {
        when.method(GET).path("/search").query_param("start", "2");
        then.status(200).json_body(serde_json::json!({
            "feed": {
                "opensearch:totalResults": "3",
                "entry": entry("uuid-3")
            }
        }));
    });

    let api = CopernicusApi::new(&section(&server, 2))?;
    let products = api.query(&request()).await?;

    first_page.assert();
    second_page.assert();
    let ids: Vec<&str> = products.iter().map(Product::id).collect();
    assert_eq!(ids, vec!["uuid-1", "uuid-2", "uuid-3"]);
    assert_eq!(products[2].cloud_cover().as_deref(), Some("4.2"));
    Ok(())
}

#[tokio::test]
async fn test_query_without_results() -> Result<()> {
    let server = MockServer::start();
    let search = server.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(200)
            .json_body(serde_json::json!({"feed": {"opensearch:totalResults": "0"}}));
    });

    let api = CopernicusApi::new(&section(&server, 100))?;
    let products = api.query(&request()).await?;

    search.assert_hits(1);
    assert!(products.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_query_unauthorized_is_not_retryable() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(401).body("Unauthorized");
    });

    let api = CopernicusApi::new(&section(&server, 100))?;
    let err = api.query(&request()).await.unwrap_err();

    assert!(matches!(err, SatflowError::ProviderError { status: 401, .. }));
    assert!(!err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_download_streams_and_verifies_archive() -> Result<()> {
    let server = MockServer::start();
    let download = server.mock(|when, then| {
        when.method(GET)
            .path_contains("uuid-1")
            .header("Authorization", BASIC_AUTH);
        then.status(200).body(zip_bytes());
    });

    let temp_dir = TempDir::new()?;
    let api = CopernicusApi::new(&section(&server, 100))?;
    let path = api.download(&sentinel("uuid-1"), temp_dir.path()).await?;

    download.assert();
    assert_eq!(path, temp_dir.path().join("S2A_MSIL1C_uuid-1.zip"));
    assert!(path.exists());

    // 已存在且完整的檔案不會重新下載
    let again = api.download(&sentinel("uuid-1"), temp_dir.path()).await?;
    assert_eq!(again, path);
    download.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_download_is_removed() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path_contains("uuid-9");
        then.status(200).body("this is not a zip archive");
    });

    let temp_dir = TempDir::new()?;
    let api = CopernicusApi::new(&section(&server, 100))?;
    let err = api
        .download(&sentinel("uuid-9"), temp_dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, SatflowError::DownloadError { .. }));
    assert!(!temp_dir.path().join("S2A_MSIL1C_uuid-9.zip").exists());
    Ok(())
}

#[test]
fn test_missing_credentials() {
    let section = CopernicusSection {
        username: Some("${SATFLOW_IT_UNSET_USER}".to_string()),
        password: Some("${SATFLOW_IT_UNSET_PASSWORD}".to_string()),
        username_env: "SATFLOW_IT_UNSET_USER".to_string(),
        password_env: "SATFLOW_IT_UNSET_PASSWORD".to_string(),
        ..CopernicusSection::default()
    };

    let err = match CopernicusApi::new(&section) {
        Err(e) => e,
        Ok(_) => panic!("credentials should be missing"),
    };
    assert!(matches!(err, SatflowError::MissingConfigError { .. }));
    assert!(err.to_string().contains("SATFLOW_IT_UNSET_USER"));
}

#[tokio::test]
async fn test_title_with_path_components_is_rejected() -> Result<()> {
    let server = MockServer::start();
    let download = server.mock(|when, then| {
        when.method(GET).path_contains("Products");
        then.status(200).body(zip_bytes());
    });

    let temp_dir = TempDir::new()?;
    let output_dir = temp_dir.path().join("satdata").join("sentinel");
    let api = CopernicusApi::new(&section(&server, 100))?;
    let product = Product::Sentinel(SentinelProduct {
        uuid: "uuid-x".to_string(),
        title: "../../escaped".to_string(),
        properties: Default::default(),
    });

    let err = api.download(&product, &output_dir).await.unwrap_err();

    assert!(matches!(err, SatflowError::ValidationError { .. }));
    download.assert_hits(0);
    assert!(!temp_dir.path().join("escaped.zip").exists());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_existing_archive_is_downloaded_again() -> Result<()> {
    let server = MockServer::start();
    let download = server.mock(|when, then| {
        when.method(GET).path_contains("uuid-2");
        then.status(200).body(zip_bytes());
    });

    let temp_dir = TempDir::new()?;
    let existing = temp_dir.path().join("S2A_MSIL1C_uuid-2.zip");
    std::fs::write(&existing, b"truncated")?;

    let api = CopernicusApi::new(&section(&server, 100))?;
    let path = api.download(&sentinel("uuid-2"), temp_dir.path()).await?;

    download.assert_hits(1);
    assert_eq!(path, existing);
    assert_eq!(std::fs::read(&path)?, zip_bytes());
    Ok(())
}

#[tokio::test]
async fn test_landsat_product_is_rejected() -> Result<()> {
    let server = MockServer::start();
    let temp_dir = TempDir::new()?;
    let api = CopernicusApi::new(&section(&server, 100))?;
    let record = serde_json::json!({"entity_id": "LC81830342021013LGN00"});
    let scene = Product::from_record(record.as_object().unwrap())?;

    let err = api.download(&scene, temp_dir.path()).await.unwrap_err();

    assert!(matches!(err, SatflowError::ProcessingError { .. }));
    assert!(err.to_string().contains("LC81830342021013LGN00"));
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);
    Ok(())
}
