mod load;
mod types;

pub use load::{get_mpbuild_data_dir, load, load_default, load_from_path, validate};
pub use types::*;
