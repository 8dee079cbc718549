use crate::core::flow::FlowRunSummary;
use crate::domain::model::Product;
use crate::domain::ports::Storage;
use crate::utils::error::{Result, SatflowError};

const CSV_HEADER: [&str; 5] = ["provider", "id", "title", "acquisition_date", "cloud_cover"];

/// 把每次執行的產品清單與摘要寫到 storage：
/// `<run_id>/products_<type>.csv` 與 `<run_id>/flow_run.json`
pub struct ManifestWriter<S: Storage> {
    storage: S,
}

impl<S: Storage> ManifestWriter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn write(&self, summary: &FlowRunSummary) -> Result<Vec<String>> {
        let mut written = Vec::new();

        for (product_type, products) in &summary.products {
            let path = format!("{}/products_{}.csv", summary.run_id, product_type);
            let data = products_csv(products)?;
            self.storage.write_file(&path, &data).await?;
            tracing::debug!("📝 Wrote {} product rows to {}", products.len(), path);
            written.push(path);
        }

        let path = format!("{}/flow_run.json", summary.run_id);
        let json = serde_json::to_vec_pretty(summary)?;
        self.storage.write_file(&path, &json).await?;
        written.push(path);

        Ok(written)
    }
}

pub fn products_csv(products: &[Product]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for product in products {
        writer.write_record([
            product.provider().to_string(),
            product.id().to_string(),
            product.title().to_string(),
            product.acquisition_date().unwrap_or_default(),
            product.cloud_cover().unwrap_or_default(),
        ])?;
    }

    writer.into_inner().map_err(|e| SatflowError::ProcessingError {
        message: format!("Failed to finish CSV manifest: {}", e),
    })
}
