pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;

#[cfg(feature = "cli")]
mod cli {
    use super::toml_config::SatflowConfig;
    use crate::domain::model::{BoundingBox, ProductType};
    use crate::utils::error::Result;
    use crate::utils::validation::Validate;
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "satflow")]
    #[command(about = "Query and download Sentinel-2 and Landsat 8 scenes for an area and date window")]
    pub struct CliConfig {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        pub config: Option<PathBuf>,

        /// Bounding box as min_lon,min_lat,max_lon,max_lat
        #[arg(long, allow_hyphen_values = true)]
        pub bbox: Option<String>,

        /// Start date (YYYYMMDD or YYYY-MM-DD)
        #[arg(long)]
        pub start_date: Option<String>,

        /// End date (YYYYMMDD or YYYY-MM-DD)
        #[arg(long)]
        pub end_date: Option<String>,

        /// Product types to harmonize, e.g. S2MSI1C,landsat_8_c1
        #[arg(long, value_delimiter = ',')]
        pub product_types: Vec<String>,

        /// Root directory for downloaded scenes
        #[arg(long)]
        pub output_root: Option<String>,

        /// Directory for run manifests (CSV/JSON)
        #[arg(long)]
        pub manifest_dir: Option<String>,

        /// Number of concurrent workers
        #[arg(long)]
        pub workers: Option<usize>,

        /// Retries for query tasks
        #[arg(long)]
        pub max_retries: Option<u32>,

        /// Seconds between query retries
        #[arg(long)]
        pub retry_delay: Option<u64>,

        /// Show the task graph without contacting any provider
        #[arg(long)]
        pub dry_run: bool,

        #[arg(short, long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log process CPU/memory usage per phase")]
        pub monitor: bool,

        #[arg(long, help = "Emit logs as JSON")]
        pub json_logs: bool,
    }

    impl CliConfig {
        /// 讀取設定檔（若有），套用命令列覆蓋後驗證
        pub fn load(&self) -> Result<SatflowConfig> {
            let mut config = match &self.config {
                Some(path) => SatflowConfig::from_file(path)?,
                None => SatflowConfig::default(),
            };
            self.apply_to(&mut config)?;
            config.validate()?;
            Ok(config)
        }

        pub fn apply_to(&self, config: &mut SatflowConfig) -> Result<()> {
            if let Some(bbox) = &self.bbox {
                let bbox: BoundingBox = bbox.parse()?;
                config.parameters.bbox = vec![bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat];
            }
            if let Some(start) = &self.start_date {
                config.parameters.start_date = start.clone();
            }
            if let Some(end) = &self.end_date {
                config.parameters.end_date = end.clone();
            }
            if !self.product_types.is_empty() {
                config.flow.product_types = self
                    .product_types
                    .iter()
                    .map(|s| s.parse::<ProductType>())
                    .collect::<Result<Vec<_>>>()?;
            }
            if let Some(root) = &self.output_root {
                config.download.output_root = root.clone();
            }
            if let Some(dir) = &self.manifest_dir {
                config.download.manifest_dir = dir.clone();
            }
            if let Some(workers) = self.workers {
                config.executor.num_workers = workers;
            }
            if let Some(retries) = self.max_retries {
                config.retry.max_retries = retries;
            }
            if let Some(delay) = self.retry_delay {
                config.retry.retry_delay_seconds = delay;
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults_without_arguments() {
            let cli = CliConfig::try_parse_from(["satflow"]).unwrap();
            let config = cli.load().unwrap();

            assert_eq!(config.parameters.start_date, "20210112");
            assert_eq!(config.flow.product_types, ProductType::all().to_vec());
        }

        #[test]
        fn test_overrides_are_applied() {
            let cli = CliConfig::try_parse_from([
                "satflow",
                "--bbox",
                "-9.5,38.6,-9.0,38.9",
                "--start-date",
                "2021-06-01",
                "--end-date",
                "2021-06-05",
                "--product-types",
                "landsat_8_c1",
                "--workers",
                "2",
                "--retry-delay",
                "1",
            ])
            .unwrap();

            let config = cli.load().unwrap();

            assert_eq!(config.parameters.bbox, vec![-9.5, 38.6, -9.0, 38.9]);
            assert_eq!(config.flow.product_types, vec![ProductType::Landsat8C1]);
            assert_eq!(config.executor.num_workers, 2);
            assert_eq!(config.retry.retry_delay_seconds, 1);
            assert_eq!(config.dates().unwrap().start.to_string(), "2021-06-01");
        }

        #[test]
        fn test_unsupported_product_type_is_rejected() {
            let cli = CliConfig::try_parse_from(["satflow", "--product-types", "S1GRD"]).unwrap();
            let err = cli.load().unwrap_err();
            assert!(err.user_friendly_message().contains("not currently supported"));
        }

        #[test]
        fn test_repeated_product_type_is_rejected() {
            let cli = CliConfig::try_parse_from([
                "satflow",
                "--product-types",
                "S2MSI1C,S2MSI1C",
            ])
            .unwrap();
            let err = cli.load().unwrap_err();
            assert!(err.user_friendly_message().contains("only once"));
        }

        #[test]
        fn test_invalid_date_window_is_rejected() {
            let cli = CliConfig::try_parse_from([
                "satflow",
                "--start-date",
                "20210114",
                "--end-date",
                "20210112",
            ])
            .unwrap();
            assert!(cli.load().is_err());
        }
    }
}
