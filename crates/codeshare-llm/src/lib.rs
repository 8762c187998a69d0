pub mod gateway;
pub mod gemini;
pub mod mock;

pub use gateway::{CompletionGateway, GatewayConfig};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use mock::{MockProvider, MockResponse};
