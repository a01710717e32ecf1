mod settings;

pub use settings::{
    save_storage_root, Config, ConfigError, StorageConfig, DEFAULT_STAGING_ROOT, EXAMPLE_CONFIG,
};
