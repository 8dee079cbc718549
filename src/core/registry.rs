use crate::adapters::{CopernicusApi, EarthExplorerApi};
use crate::config::toml_config::ProvidersSection;
use crate::domain::model::{ProductType, Provider};
use crate::domain::ports::ProviderApi;
use crate::utils::error::{Result, SatflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// 依產品類型或產品來源找到對應的供應商
///
/// 建立失敗（例如缺少帳密）的供應商只記錄錯誤，讓其他分支照常執行。
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<Provider, Arc<dyn ProviderApi>>,
    unavailable: HashMap<Provider, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, api: Arc<dyn ProviderApi>) {
        let provider = api.provider();
        self.unavailable.remove(&provider);
        self.providers.insert(provider, api);
    }

    pub fn mark_unavailable(&mut self, provider: Provider, reason: impl Into<String>) {
        self.providers.remove(&provider);
        self.unavailable.insert(provider, reason.into());
    }

    /// 只建立所需產品類型用得到的供應商
    pub fn from_config(section: &ProvidersSection, product_types: &[ProductType]) -> Self {
        let mut registry = Self::new();

        for provider in product_types.iter().map(ProductType::provider) {
            if registry.providers.contains_key(&provider) || registry.unavailable.contains_key(&provider) {
                continue;
            }

            let built: Result<Arc<dyn ProviderApi>> = match provider {
                Provider::Copernicus => CopernicusApi::new(&section.copernicus)
                    .map(|api| Arc::new(api) as Arc<dyn ProviderApi>),
                Provider::EarthExplorer => EarthExplorerApi::new(&section.earth_explorer)
                    .map(|api| Arc::new(api) as Arc<dyn ProviderApi>),
            };

            match built {
                Ok(api) => registry.register(api),
                Err(e) => {
                    tracing::warn!("⚠️ {} provider unavailable: {}", provider, e);
                    registry.mark_unavailable(provider, e.to_string());
                }
            }
        }

        registry
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ProviderApi>> {
        if let Some(api) = self.providers.get(&provider) {
            return Ok(Arc::clone(api));
        }

        Err(SatflowError::ConfigError {
            message: match self.unavailable.get(&provider) {
                Some(reason) => format!("{} provider is unavailable: {}", provider, reason),
                None => format!("{} provider is not configured", provider),
            },
        })
    }

    pub fn for_product_type(&self, product_type: ProductType) -> Result<Arc<dyn ProviderApi>> {
        self.get(product_type.provider())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::{CopernicusSection, EarthExplorerSection};

    #[test]
    fn test_missing_credentials_mark_provider_unavailable() {
        let section = ProvidersSection {
            copernicus: CopernicusSection {
                username: Some("user".to_string()),
                password: Some("pass".to_string()),
                ..CopernicusSection::default()
            },
            earth_explorer: EarthExplorerSection {
                username: Some("${SATFLOW_REGISTRY_TEST_USER}".to_string()),
                password: None,
                username_env: "SATFLOW_REGISTRY_TEST_USER".to_string(),
                password_env: "SATFLOW_REGISTRY_TEST_PASSWORD".to_string(),
                ..EarthExplorerSection::default()
            },
        };

        let registry = ProviderRegistry::from_config(&section, &ProductType::all());

        assert!(registry.for_product_type(ProductType::S2Msi1c).is_ok());
        let err = match registry.for_product_type(ProductType::Landsat8C1) {
            Err(e) => e,
            Ok(_) => panic!("EarthExplorer should be unavailable"),
        };
        assert!(err.to_string().contains("unavailable"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_requested_providers_are_built() {
        let section = ProvidersSection {
            copernicus: CopernicusSection {
                username: Some("user".to_string()),
                password: Some("pass".to_string()),
                ..CopernicusSection::default()
            },
            ..ProvidersSection::default()
        };

        let registry = ProviderRegistry::from_config(&section, &[ProductType::S2Msi1c]);

        let err = match registry.get(Provider::EarthExplorer) {
            Err(e) => e,
            Ok(_) => panic!("EarthExplorer should not be configured"),
        };
        assert!(err.to_string().contains("not configured"));
    }
}
