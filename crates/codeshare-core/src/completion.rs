use async_trait::async_trait;

use crate::errors::GatewayError;

/// Options for a single completion request.
#[derive(Clone, Debug)]
pub struct CompletionOptions {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: Some(256),
            temperature: Some(0.2),
        }
    }
}

/// A text-generation backend. One upstream call per `complete`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, GatewayError>;
}
