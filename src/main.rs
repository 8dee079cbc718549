use clap::Parser;
use satflow::core::flow::FlowParameters;
use satflow::utils::error::ErrorSeverity;
use satflow::utils::logger;
use satflow::{
    CliConfig, FlowSettings, HarmonizationFlow, LocalStorage, ManifestWriter, ProviderRegistry,
    SatflowError,
};

fn report_and_exit(e: &SatflowError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.severity().exit_code());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting satflow");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 載入並驗證配置
    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => report_and_exit(&e),
    };
    let parameters = match FlowParameters::from_config(&config) {
        Ok(parameters) => parameters,
        Err(e) => report_and_exit(&e),
    };
    let settings = FlowSettings::from_config(&config);

    if cli.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no provider will be contacted");
        println!("Flow: {} (project: {})", settings.name, settings.project);
        println!(
            "Parameters: bbox={} start={} end={}",
            parameters.bbox, parameters.dates.start, parameters.dates.end
        );
        let flow = HarmonizationFlow::new(settings, ProviderRegistry::new());
        for task in flow.describe() {
            println!(
                "  - {} [{}] retries={} upstream={}",
                task.name,
                task.provider,
                task.retry.max_retries,
                task.upstream.as_deref().unwrap_or("-")
            );
        }
        return Ok(());
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let registry = ProviderRegistry::from_config(&config.providers, &settings.product_types);
    let flow = HarmonizationFlow::new(settings, registry).with_monitoring(cli.monitor);
    let summary = flow.run(&parameters).await;

    let storage = LocalStorage::new(&config.download.manifest_dir);
    let manifest_dir = storage.base_path().to_path_buf();
    let manifest = ManifestWriter::new(storage);
    match manifest.write(&summary).await {
        Ok(files) => {
            for file in files {
                tracing::info!("📁 Manifest saved to: {}", manifest_dir.join(file).display());
            }
        }
        Err(e) => tracing::warn!("⚠️ Could not write run manifest: {}", e),
    }

    tracing::debug!("Flow run overview: {:?}", summary.overview());

    if summary.is_success() {
        println!("✅ Flow run {} completed successfully!", summary.run_id);
        for (product_type, paths) in &summary.downloads {
            println!("📁 {}: {} scene(s) downloaded", product_type, paths.len());
        }
        Ok(())
    } else {
        eprintln!("❌ Flow run {} failed", summary.run_id);
        for task in summary.failed_tasks() {
            eprintln!("   {} -> {:?}", task.name, task.state);
        }
        // 只有 TriggerFailed 而沒有實際失敗的任務時，視為處理錯誤
        let severity = summary.worst_severity().unwrap_or(ErrorSeverity::High);
        std::process::exit(severity.exit_code());
    }
}
