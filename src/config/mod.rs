pub mod loader;
pub mod schema;
pub mod settings;

pub use loader::{
    load_request_from_path, load_request_from_str, load_settings_from_path,
    load_settings_from_str, ConfigError, RequestFormat,
};
pub use schema::{BatchRequest, ValidationError, ValidationIssue};
pub use settings::{Settings, SETTINGS_FILE_NAME};
