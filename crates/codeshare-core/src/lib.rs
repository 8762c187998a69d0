pub mod completion;
pub mod errors;
pub mod execution;
pub mod ids;
pub mod security;

pub use completion::CompletionProvider;
pub use errors::{ConnectionError, DeliveryError, GatewayError};
pub use execution::{ExecutionRequest, ExecutionResult, ExecutionStatus};
pub use ids::{ConnectionId, SessionId};
