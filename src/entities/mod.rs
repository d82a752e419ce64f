pub mod ai_model;
pub mod alert;
pub mod alert_setting;
pub mod batch;
pub mod line;
pub mod measure;
pub mod prediction;
pub mod product;
pub mod sensor;
pub mod warehouse;
