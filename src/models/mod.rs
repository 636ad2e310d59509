pub mod records;
pub mod usage;
