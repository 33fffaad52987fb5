pub mod error;
pub mod validation;
pub mod formats;
pub mod fs;

pub use error::{ConfigError, EngineError, EngineResult};
pub use validation::{validate_input_path, validate_run};
pub use formats::{ImageFormat, format_from_extension, is_supported_input};
pub use fs::{
    ensure_parent_dir,
    extract_filename,
    remove_temp_dir,
    remove_temp_file,
    temp_dir,
    temp_path,
};
