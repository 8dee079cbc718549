use crate::domain::model::Provider;
use crate::utils::error::{Result, SatflowError};
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const ERROR_BODY_LIMIT: usize = 512;

pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("satflow/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// 非 2xx 回應轉成 `ProviderError`，附上截斷後的回應內容
pub async fn ensure_success(provider: Provider, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    tracing::debug!("{} responded with {}: {}", provider, status, message);

    Err(SatflowError::ProviderError {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            message
        },
    })
}

/// 供應商回傳的名稱只能是單一檔名，含目錄分隔或 `..` 時拒絕
pub fn download_path(output_dir: &Path, name: &str, extension: &str) -> Result<PathBuf> {
    let file_name = format!("{}.{}", name, extension);
    let is_plain = !name.trim().is_empty()
        && !name.contains(['/', '\\', '\0'])
        && Path::new(&file_name).file_name().and_then(|n| n.to_str()) == Some(file_name.as_str());

    if !is_plain {
        return Err(SatflowError::ValidationError {
            message: format!("'{}' is not a valid download file name", name),
        });
    }
    Ok(output_dir.join(file_name))
}

pub fn incomplete_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".incomplete");
    PathBuf::from(name)
}

/// 串流寫入 `<dest>.incomplete`，完成後改名為 `dest`
pub async fn stream_to_file(mut response: Response, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = incomplete_path(dest);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut written: u64 = 0;

    let outcome: Result<()> = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        drop(file);
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    drop(file);
    tokio::fs::rename(&partial, dest).await?;
    tracing::debug!("Wrote {} bytes to {}", written, dest.display());
    Ok(written)
}
