use crate::config::toml_config::{SatflowConfig, DEFAULT_FLOW_NAME, DEFAULT_PROJECT_NAME};
use crate::core::executor::FlowExecutor;
use crate::core::registry::ProviderRegistry;
use crate::core::task::{upstream_failed, RetryPolicy, TaskRun};
use crate::domain::model::{BoundingBox, DateRange, Product, ProductType, Provider, QueryRequest};
use crate::utils::error::{ErrorSeverity, Result};
use crate::utils::monitor::FlowMonitor;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// 工作流程參數
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowParameters {
    pub bbox: BoundingBox,
    pub dates: DateRange,
}

impl FlowParameters {
    pub fn new(bbox: BoundingBox, dates: DateRange) -> Self {
        Self { bbox, dates }
    }

    pub fn from_config(config: &SatflowConfig) -> Result<Self> {
        Ok(Self::new(config.bbox()?, config.dates()?))
    }

    pub fn request(&self, product_type: ProductType) -> QueryRequest {
        QueryRequest {
            product_type,
            bbox: self.bbox,
            dates: self.dates,
        }
    }
}

impl Default for FlowParameters {
    fn default() -> Self {
        Self {
            bbox: BoundingBox {
                min_lon: 23.5,
                min_lat: 37.7,
                max_lon: 24.0,
                max_lat: 38.2,
            },
            dates: DateRange {
                start: NaiveDate::from_ymd_opt(2021, 1, 12).unwrap_or_default(),
                end: NaiveDate::from_ymd_opt(2021, 1, 14).unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub name: String,
    pub project: String,
    pub product_types: Vec<ProductType>,
    pub num_workers: usize,
    pub query_retry: RetryPolicy,
    pub output_root: PathBuf,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_FLOW_NAME.to_string(),
            project: DEFAULT_PROJECT_NAME.to_string(),
            product_types: ProductType::all().to_vec(),
            num_workers: 8,
            query_retry: RetryPolicy::default(),
            output_root: PathBuf::from("../satdata"),
        }
    }
}

impl FlowSettings {
    pub fn from_config(config: &SatflowConfig) -> Self {
        Self {
            name: config.flow.name.clone(),
            project: config.flow.project.clone(),
            product_types: config.flow.product_types.clone(),
            num_workers: config.executor.num_workers,
            query_retry: RetryPolicy::new(config.retry.max_retries, config.retry_delay()),
            output_root: PathBuf::from(&config.download.output_root),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Success,
    Failed,
}

/// 一次工作流程執行的結果
#[derive(Debug, Clone, Serialize)]
pub struct FlowRunSummary {
    pub flow_name: String,
    pub project: String,
    pub run_id: String,
    pub parameters: FlowParameters,
    pub state: FlowState,
    pub tasks: Vec<TaskRun>,
    pub products: BTreeMap<ProductType, Vec<Product>>,
    pub downloads: BTreeMap<ProductType, Vec<PathBuf>>,
    pub duration_ms: u64,
}

impl FlowRunSummary {
    pub fn is_success(&self) -> bool {
        self.state == FlowState::Success
    }

    pub fn task(&self, name: &str) -> Option<&TaskRun> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn failed_tasks(&self) -> Vec<&TaskRun> {
        self.tasks.iter().filter(|t| !t.state.is_success()).collect()
    }

    /// 失敗任務中最嚴重的等級；沒有任務真正失敗時為 None
    pub fn worst_severity(&self) -> Option<ErrorSeverity> {
        self.tasks.iter().filter_map(|t| t.state.severity()).max()
    }

    pub fn total_products(&self) -> usize {
        self.products.values().map(Vec::len).sum()
    }

    pub fn total_downloads(&self) -> usize {
        self.downloads.values().map(Vec::len).sum()
    }

    /// 精簡摘要，給日誌與 CLI 輸出
    pub fn overview(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        summary.insert("run_id".to_string(), serde_json::Value::String(self.run_id.clone()));
        summary.insert("total_tasks".to_string(), self.tasks.len().into());
        summary.insert("failed_tasks".to_string(), self.failed_tasks().len().into());
        summary.insert("total_products".to_string(), self.total_products().into());
        summary.insert("total_downloads".to_string(), self.total_downloads().into());
        summary.insert("duration_ms".to_string(), self.duration_ms.into());
        summary
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskPlan {
    pub name: String,
    pub upstream: Option<String>,
    pub provider: Provider,
    pub retry: RetryPolicy,
}

pub fn query_task_name(product_type: ProductType) -> String {
    format!("query[{}]", product_type)
}

pub fn download_task_name(product_type: ProductType) -> String {
    format!("download_all[{}]", product_type)
}

/// 查詢任務：依產品類型選擇供應商並回傳可用產品
pub async fn query(registry: &ProviderRegistry, request: &QueryRequest) -> Result<Vec<Product>> {
    let api = registry.for_product_type(request.product_type)?;
    api.query(request).await
}

/// 下載任務：依序下載，每個產品依來源放到 `<root>/sentinel` 或 `<root>/landsat`
pub async fn download_all(
    registry: &ProviderRegistry,
    products: &[Product],
    output_root: &Path,
) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(products.len());
    for product in products {
        let provider = product.provider();
        let api = registry.get(provider)?;
        let output_dir = output_root.join(provider.output_subdir());
        paths.push(api.download(product, &output_dir).await?);
    }
    Ok(paths)
}

struct BranchOutcome {
    product_type: ProductType,
    tasks: Vec<TaskRun>,
    products: Option<Vec<Product>>,
    downloads: Option<Vec<PathBuf>>,
}

async fn run_branch(
    executor: FlowExecutor,
    registry: Arc<ProviderRegistry>,
    request: QueryRequest,
    query_retry: RetryPolicy,
    output_root: PathBuf,
) -> BranchOutcome {
    let product_type = request.product_type;
    let query_name = query_task_name(product_type);
    let download_name = download_task_name(product_type);

    let (queried, query_run) = executor
        .run_task(&query_name, &query_retry, |_| {
            let registry = Arc::clone(&registry);
            let request = request.clone();
            async move { query(&registry, &request).await }
        })
        .await;

    let products = match queried {
        Ok(products) => products,
        Err(_) => {
            tracing::warn!("⏭️ {}", upstream_failed(&download_name, &query_name));
            return BranchOutcome {
                product_type,
                tasks: vec![query_run, TaskRun::trigger_failed(download_name)],
                products: None,
                downloads: None,
            };
        }
    };

    let (downloaded, download_run) = executor
        .run_task(&download_name, &RetryPolicy::none(), |_| {
            let registry = Arc::clone(&registry);
            let products = products.clone();
            let output_root = output_root.clone();
            async move { download_all(&registry, &products, &output_root).await }
        })
        .await;

    BranchOutcome {
        product_type,
        tasks: vec![query_run, download_run],
        products: Some(products),
        downloads: downloaded.ok(),
    }
}

/// 感測器調和工作流程：每個產品類型各一條「查詢 → 下載」分支，分支之間並行
pub struct HarmonizationFlow {
    settings: FlowSettings,
    registry: Arc<ProviderRegistry>,
    executor: FlowExecutor,
    monitor: FlowMonitor,
}

impl HarmonizationFlow {
    pub fn new(settings: FlowSettings, registry: ProviderRegistry) -> Self {
        let executor = FlowExecutor::new(settings.num_workers);
        Self {
            settings,
            registry: Arc::new(registry),
            executor,
            monitor: FlowMonitor::default(),
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = FlowMonitor::new(enabled);
        self
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// 不連網，只列出任務與相依關係
    pub fn describe(&self) -> Vec<TaskPlan> {
        self.settings
            .product_types
            .iter()
            .flat_map(|&product_type| {
                let query_name = query_task_name(product_type);
                [
                    TaskPlan {
                        name: query_name.clone(),
                        upstream: None,
                        provider: product_type.provider(),
                        retry: self.settings.query_retry,
                    },
                    TaskPlan {
                        name: download_task_name(product_type),
                        upstream: Some(query_name),
                        provider: product_type.provider(),
                        retry: RetryPolicy::none(),
                    },
                ]
            })
            .collect()
    }

    pub async fn run(&self, parameters: &FlowParameters) -> FlowRunSummary {
        let started = Instant::now();
        let run_id = format!("flow_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"));

        tracing::info!(
            "🚀 Starting flow '{}' ({}) run {} with {} worker(s)",
            self.settings.name,
            self.settings.project,
            run_id,
            self.executor.num_workers()
        );
        tracing::info!(
            "📍 bbox={} dates={}..{}",
            parameters.bbox,
            parameters.dates.start,
            parameters.dates.end
        );
        self.monitor.log_phase("Flow started");

        let mut branches = JoinSet::new();
        for &product_type in &self.settings.product_types {
            branches.spawn(run_branch(
                self.executor.clone(),
                Arc::clone(&self.registry),
                parameters.request(product_type),
                self.settings.query_retry,
                self.settings.output_root.clone(),
            ));
        }

        let mut outcomes = Vec::with_capacity(self.settings.product_types.len());
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("❌ Flow branch aborted: {}", e),
            }
        }

        let mut summary = self.summarize(run_id, parameters, outcomes);
        summary.duration_ms = started.elapsed().as_millis() as u64;

        self.monitor.log_phase("Flow finished");
        match summary.state {
            FlowState::Success => tracing::info!(
                "✅ Flow run {} succeeded: {} product(s) found, {} downloaded",
                summary.run_id,
                summary.total_products(),
                summary.total_downloads()
            ),
            FlowState::Failed => tracing::error!(
                "❌ Flow run {} failed: {} task(s) did not succeed",
                summary.run_id,
                summary.failed_tasks().len()
            ),
        }

        summary
    }

    fn summarize(
        &self,
        run_id: String,
        parameters: &FlowParameters,
        mut outcomes: Vec<BranchOutcome>,
    ) -> FlowRunSummary {
        // 依設定中的產品順序排列，與完成先後無關
        let order = |pt: ProductType| {
            self.settings
                .product_types
                .iter()
                .position(|&p| p == pt)
                .unwrap_or(usize::MAX)
        };
        outcomes.sort_by_key(|o| order(o.product_type));

        let expected_tasks = self.settings.product_types.len() * 2;
        let mut tasks = Vec::with_capacity(expected_tasks);
        let mut products = BTreeMap::new();
        let mut downloads = BTreeMap::new();

        for outcome in outcomes {
            tasks.extend(outcome.tasks);
            if let Some(found) = outcome.products {
                products.insert(outcome.product_type, found);
            }
            if let Some(paths) = outcome.downloads {
                downloads.insert(outcome.product_type, paths);
            }
        }

        let all_succeeded =
            tasks.len() == expected_tasks && tasks.iter().all(|t| t.state.is_success());

        FlowRunSummary {
            flow_name: self.settings.name.clone(),
            project: self.settings.project.clone(),
            run_id,
            parameters: parameters.clone(),
            state: if all_succeeded {
                FlowState::Success
            } else {
                FlowState::Failed
            },
            tasks,
            products,
            downloads,
            duration_ms: 0,
        }
    }
}
