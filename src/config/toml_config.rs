use crate::domain::model::{BoundingBox, DateRange, ProductType};
use crate::utils::error::{Result, SatflowError};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_required_field,
    validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_FLOW_NAME: &str = "Sensor Harmonization Workflow";
pub const DEFAULT_PROJECT_NAME: &str = "satellite_harmonization";
pub const COPERNICUS_API_URL: &str = "https://scihub.copernicus.eu/dhus";
pub const EARTH_EXPLORER_API_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SatflowConfig {
    pub flow: FlowSection,
    pub parameters: ParametersSection,
    pub executor: ExecutorSection,
    pub retry: RetrySection,
    pub download: DownloadSection,
    pub providers: ProvidersSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSection {
    pub name: String,
    pub project: String,
    pub product_types: Vec<ProductType>,
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            name: DEFAULT_FLOW_NAME.to_string(),
            project: DEFAULT_PROJECT_NAME.to_string(),
            product_types: ProductType::all().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametersSection {
    pub bbox: Vec<f64>,
    pub start_date: String,
    pub end_date: String,
}

impl Default for ParametersSection {
    fn default() -> Self {
        Self {
            bbox: vec![23.5, 37.7, 24.0, 38.2],
            start_date: "20210112".to_string(),
            end_date: "20210114".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub num_workers: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self { num_workers: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub output_root: String,
    /// 執行結果清單 (CSV/JSON) 的輸出目錄
    pub manifest_dir: String,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            output_root: "../satdata".to_string(),
            manifest_dir: "../satdata/runs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub copernicus: CopernicusSection,
    pub earth_explorer: EarthExplorerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopernicusSection {
    pub api_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 設定檔未提供帳密時讀取的環境變數
    pub username_env: String,
    pub password_env: String,
    pub page_size: usize,
    pub timeout_seconds: u64,
}

impl Default for CopernicusSection {
    fn default() -> Self {
        Self {
            api_url: COPERNICUS_API_URL.to_string(),
            username: None,
            password: None,
            username_env: "DHUS_USER".to_string(),
            password_env: "DHUS_PASSWORD".to_string(),
            page_size: 100,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EarthExplorerSection {
    pub api_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub username_env: String,
    pub password_env: String,
    pub max_results: usize,
    pub timeout_seconds: u64,
}

impl Default for EarthExplorerSection {
    fn default() -> Self {
        Self {
            api_url: EARTH_EXPLORER_API_URL.to_string(),
            username: None,
            password: None,
            username_env: "LANDSATXPLORE_USERNAME".to_string(),
            password_env: "LANDSATXPLORE_PASSWORD".to_string(),
            max_results: 100,
            timeout_seconds: 60,
        }
    }
}

/// 供應商帳號密碼，Debug 輸出不含密碼
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// 設定檔優先，其次是環境變數
    pub fn resolve(
        username: Option<&str>,
        password: Option<&str>,
        username_var: &str,
        password_var: &str,
    ) -> Result<Self> {
        let pick = |configured: Option<&str>, var: &str| {
            configured
                .filter(|v| is_resolved(v))
                .map(str::to_string)
                .or_else(|| std::env::var(var).ok().filter(|v| !v.is_empty()))
        };

        let field = format!("{} / {}", username_var, password_var);
        let username = pick(username, username_var);
        let password = pick(password, password_var);
        Ok(Self {
            username: validate_required_field(&field, &username)?.clone(),
            password: validate_required_field(&field, &password)?.clone(),
        })
    }
}

impl CopernicusSection {
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::resolve(
            self.username.as_deref(),
            self.password.as_deref(),
            &self.username_env,
            &self.password_env,
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl EarthExplorerSection {
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::resolve(
            self.username.as_deref(),
            self.password.as_deref(),
            &self.username_env,
            &self.password_env,
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"))
}

// 未被替換的 ${VAR} 視為未設定
fn is_resolved(value: &str) -> bool {
    !value.trim().is_empty() && !placeholder_regex().is_match(value)
}

impl SatflowConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| SatflowError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${DHUS_USER})，找不到的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        placeholder_regex()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn bbox(&self) -> Result<BoundingBox> {
        BoundingBox::from_slice(&self.parameters.bbox)
    }

    pub fn dates(&self) -> Result<DateRange> {
        DateRange::parse(&self.parameters.start_date, &self.parameters.end_date)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.retry_delay_seconds)
    }
}

impl Validate for SatflowConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("flow.name", &self.flow.name)?;
        if self.flow.product_types.is_empty() {
            return Err(SatflowError::InvalidConfigValueError {
                field: "flow.product_types".to_string(),
                value: "[]".to_string(),
                reason: "At least one product type must be requested".to_string(),
            });
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.flow.product_types.iter().find(|pt| !seen.insert(**pt)) {
            return Err(SatflowError::InvalidConfigValueError {
                field: "flow.product_types".to_string(),
                value: duplicate.to_string(),
                reason: "Each product type may be requested only once".to_string(),
            });
        }

        self.bbox()?;
        self.dates()?;

        validate_positive_number("executor.num_workers", self.executor.num_workers, 1)?;
        validate_path("download.output_root", &self.download.output_root)?;
        validate_path("download.manifest_dir", &self.download.manifest_dir)?;

        validate_url("providers.copernicus.api_url", &self.providers.copernicus.api_url)?;
        validate_positive_number(
            "providers.copernicus.page_size",
            self.providers.copernicus.page_size,
            1,
        )?;
        validate_url(
            "providers.earth_explorer.api_url",
            &self.providers.earth_explorer.api_url,
        )?;
        validate_positive_number(
            "providers.earth_explorer.max_results",
            self.providers.earth_explorer.max_results,
            1,
        )?;

        Ok(())
    }
}
