pub mod alerts;
pub mod attributes;
pub mod ingestion;
pub mod prediction;
pub mod provisioning;
pub mod readings;
pub mod thresholds;
