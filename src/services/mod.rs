pub mod error_classifier;
pub mod executor;
pub mod model_family;
pub mod model_selection;
pub mod params;
pub mod prompts;
pub mod response_validator;

pub use error_classifier::{classify_error, classify_status, AttemptFailure, ErrorClassification};
pub use model_family::classify;
pub use model_selection::{select_models, ModelSelection};
pub use response_validator::{extract_json, validate_response, OutputError};
