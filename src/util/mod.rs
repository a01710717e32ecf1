//! Utility modules

pub mod paths;
pub mod shell;

pub use paths::{config_path, data_dir, database_path, init_data_dir, log_file_path, logs_dir};
pub use shell::{is_numeric_id, is_valid_profile_name, quote, quote_path};
