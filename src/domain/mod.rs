// Domain layer: scene/product models and the provider/storage ports.

pub mod model;
pub mod ports;
