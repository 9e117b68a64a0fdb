pub mod metrics;
pub mod service;
pub mod version;
pub mod wol;
