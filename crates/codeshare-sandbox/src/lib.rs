mod capture;
pub mod error;
pub mod executor;
mod process;

pub use capture::TRUNCATION_MARKER;
pub use error::SandboxError;
pub use executor::{SandboxConfig, SandboxExecutor};
