use std::sync::Arc;
use std::time::Duration;

use codeshare_core::completion::{CompletionOptions, CompletionProvider};
use codeshare_core::errors::GatewayError;
use tracing::instrument;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tokens a model may put on the first line of a fenced block or on a line of its own.
const LANGUAGE_TAGS: &[&str] = &["python", "python3", "py"];

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Upper bound on one upstream call.
    pub request_timeout: Duration,
    pub options: CompletionOptions,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            options: CompletionOptions::default(),
        }
    }
}

/// Narrow boundary around a completion provider.
///
/// `suggest` always returns a string: upstream errors, timeouts and provider panics
/// are logged and become an empty suggestion.
#[derive(Clone)]
pub struct CompletionGateway {
    provider: Option<Arc<dyn CompletionProvider>>,
    config: GatewayConfig,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: GatewayConfig) -> Self {
        Self {
            provider: Some(provider),
            config,
        }
    }

    /// A gateway with no upstream. Every suggestion is empty.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            config: GatewayConfig::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    #[instrument(skip(self, code), fields(code_len = code.len()))]
    pub async fn suggest(&self, code: &str) -> String {
        if code.trim().is_empty() {
            return String::new();
        }
        let Some(provider) = &self.provider else {
            tracing::debug!("completion provider not configured");
            return String::new();
        };

        let provider_name = provider.name().to_string();
        let model = provider.model().to_string();
        let provider = Arc::clone(provider);
        let options = self.config.options.clone();
        let prompt = build_prompt(code);

        // Spawned so a panicking provider surfaces as a JoinError instead of unwinding here.
        let task = tokio::spawn(async move { provider.complete(&prompt, &options).await });
        let abort = task.abort_handle();

        let error = match tokio::time::timeout(self.config.request_timeout, task).await {
            Ok(Ok(Ok(raw))) => return clean_suggestion(&raw),
            Ok(Ok(Err(e))) => e,
            Ok(Err(join_err)) => {
                tracing::error!(
                    provider = %provider_name,
                    model = %model,
                    error = %join_err,
                    "completion task failed"
                );
                return String::new();
            }
            Err(_) => {
                abort.abort();
                GatewayError::Timeout(self.config.request_timeout)
            }
        };

        tracing::warn!(
            provider = %provider_name,
            model = %model,
            error_kind = error.error_kind(),
            error = %error,
            "completion request failed"
        );
        String::new()
    }
}

/// Prompt asking for a single-line continuation of `code`.
pub fn build_prompt(code: &str) -> String {
    format!(
        "You are an expert Python programmer. Provide a single-line code completion for the \
         following Python code. Do not repeat the code I have already written. Provide only \
         the completion text.\n\n# My Code:\n{code}\n\n# Your Completion:"
    )
}

/// Strip formatting the model may wrap its answer in: code fences, a language tag and
/// inline backticks.
pub fn clean_suggestion(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.split_once('\n') {
            Some((first, body)) if is_fence_info(first) => body,
            _ => strip_inline_tag(rest),
        };
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text);
    } else if let Some((first, body)) = text.split_once('\n') {
        if LANGUAGE_TAGS.contains(&first.trim().to_ascii_lowercase().as_str()) {
            text = body;
        }
    }

    let text = text.trim();
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        return text.trim_matches('`').trim().to_string();
    }
    text.to_string()
}

/// One-line fences carry the tag and the code on the same line.
fn strip_inline_tag(text: &str) -> &str {
    match text.split_once(char::is_whitespace) {
        Some((first, rest)) if LANGUAGE_TAGS.contains(&first.to_ascii_lowercase().as_str()) => {
            rest.trim_start()
        }
        _ => text,
    }
}

/// The text after an opening fence is an info string (possibly empty), not code.
fn is_fence_info(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '#' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};

    fn gateway_with(responses: Vec<MockResponse>) -> (CompletionGateway, Arc<MockProvider>) {
        let mock = Arc::new(MockProvider::new(responses));
        let gateway = CompletionGateway::new(mock.clone(), GatewayConfig::default());
        (gateway, mock)
    }

    #[tokio::test]
    async fn empty_code_skips_upstream() {
        let (gateway, mock) = gateway_with(vec![MockResponse::text("unused")]);
        assert_eq!(gateway.suggest("").await, "");
        assert_eq!(gateway.suggest("   \n\t").await, "");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn suggestion_is_cleaned() {
        let (gateway, mock) =
            gateway_with(vec![MockResponse::text("```python\nprint('done')\n```")]);
        assert_eq!(gateway.suggest("x = 1\n").await, "print('done')");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn prompt_contains_code() {
        let (gateway, mock) = gateway_with(vec![MockResponse::text("y")]);
        gateway.suggest("def add(a, b):").await;
        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("# My Code:\ndef add(a, b):\n"));
        assert!(prompts[0].ends_with("# Your Completion:"));
    }

    #[tokio::test]
    async fn upstream_error_becomes_empty() {
        let (gateway, mock) = gateway_with(vec![MockResponse::Error(
            GatewayError::ServerError {
                status: 500,
                body: "boom".into(),
            },
        )]);
        assert_eq!(gateway.suggest("import os").await, "");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_panic_becomes_empty() {
        let (gateway, _mock) = gateway_with(vec![MockResponse::Panic("forced failure".into())]);
        assert_eq!(gateway.suggest("import os").await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(60),
            MockResponse::text("too late"),
        )]));
        let gateway = CompletionGateway::new(
            mock,
            GatewayConfig {
                request_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );
        assert_eq!(gateway.suggest("x").await, "");
    }

    #[tokio::test]
    async fn disabled_gateway_is_empty() {
        let gateway = CompletionGateway::disabled();
        assert!(!gateway.is_enabled());
        assert_eq!(gateway.suggest("print(").await, "");
    }

    #[test]
    fn clean_plain_text_is_trimmed() {
        assert_eq!(clean_suggestion("  return a + b \n"), "return a + b");
    }

    #[test]
    fn clean_fence_without_language() {
        assert_eq!(clean_suggestion("```\nx += 1\n```"), "x += 1");
    }

    #[test]
    fn clean_single_line_fence() {
        assert_eq!(clean_suggestion("```print(x)```"), "print(x)");
    }

    #[test]
    fn clean_single_line_fence_with_language() {
        assert_eq!(clean_suggestion("```python print(x)```"), "print(x)");
        assert_eq!(clean_suggestion("```Py  import os```"), "import os");
    }

    #[test]
    fn clean_single_line_fence_keeps_leading_identifier() {
        assert_eq!(clean_suggestion("```pyx = 1```"), "pyx = 1");
    }

    #[test]
    fn clean_bare_language_line() {
        assert_eq!(clean_suggestion("python\nimport sys"), "import sys");
    }

    #[test]
    fn clean_inline_backticks() {
        assert_eq!(clean_suggestion("`total += n`"), "total += n");
    }

    #[test]
    fn clean_keeps_python_inside_code() {
        assert_eq!(
            clean_suggestion("print('python is fun')"),
            "print('python is fun')"
        );
    }

    #[test]
    fn clean_empty_fence() {
        assert_eq!(clean_suggestion("```python\n```"), "");
    }
}
