pub mod ndiffer;

pub use ndiffer::{DiffConfig, DiscrepancyRecord, NDiffer};
