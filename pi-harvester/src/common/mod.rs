pub mod util;

pub use util::{compare_versions, format_elapsed, split_csv};
