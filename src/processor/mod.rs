pub mod column_standardizer;
pub mod columns;
pub mod comparison;
pub mod data_dictionary;
pub mod field_normalizer;
pub mod integrator;
pub mod kpi_engine;
pub mod quality_metrics;

pub use comparison::*;
pub use data_dictionary::*;
pub use integrator::*;
pub use kpi_engine::*;
pub use quality_metrics::*;
