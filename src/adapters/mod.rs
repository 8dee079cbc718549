// Adapters layer: concrete implementations of the domain ports (providers, storage, http).

pub mod copernicus;
pub mod earth_explorer;
pub mod http;
pub mod storage;

pub use copernicus::CopernicusApi;
pub use earth_explorer::EarthExplorerApi;
pub use storage::LocalStorage;
