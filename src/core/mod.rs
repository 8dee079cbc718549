pub mod executor;
pub mod flow;
pub mod manifest;
pub mod registry;
pub mod task;

pub use crate::domain::model::{Product, ProductType, Provider, QueryRequest};
pub use crate::domain::ports::{ProviderApi, Storage};
pub use crate::utils::error::Result;
