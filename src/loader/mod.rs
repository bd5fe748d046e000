pub mod error;
pub mod monthly_loader;
pub mod sheet_loader;

pub use monthly_loader::*;
pub use sheet_loader::*;
