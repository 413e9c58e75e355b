pub mod toml_loader;

pub use toml_loader::{load_notes, load_submission, parse_submission};
