pub mod non_null_rate;
pub mod row_count;

pub use non_null_rate::{NonNullRate, NON_NULL_RATE};
pub use row_count::{RowCount, ROW_COUNT};
