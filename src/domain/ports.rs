use crate::domain::model::{Product, Provider, QueryRequest};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 衛星資料供應商：查詢可用產品並下載
#[async_trait]
pub trait ProviderApi: Send + Sync {
    fn provider(&self) -> Provider;

    async fn query(&self, request: &QueryRequest) -> Result<Vec<Product>>;

    /// 下載單一產品到 `output_dir`，回傳檔案路徑
    async fn download(&self, product: &Product, output_dir: &Path) -> Result<PathBuf>;
}
