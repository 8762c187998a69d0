use serde::{Deserialize, Serialize};

/// Body text returned when an execution hits the wall-clock limit.
pub const TIMED_OUT_MESSAGE: &str = "Execution timed out.";

/// A request to run a snippet of code. Missing `code` is treated as empty.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
}

/// Outcome of one sandboxed execution. Exactly one variant per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Exit status 0.
    Success { stdout: String },
    /// The code itself failed. `exit_code` is `None` when the child died from a signal.
    Failure {
        stderr: String,
        exit_code: Option<i32>,
    },
    /// Wall-clock limit reached; the child was killed and reaped.
    TimedOut,
    /// The sandbox could not run the code at all.
    InternalError { message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    TimedOut,
    InternalError,
}

impl ExecutionResult {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Success { .. } => ExecutionStatus::Success,
            Self::Failure { .. } => ExecutionStatus::Failure,
            Self::TimedOut => ExecutionStatus::TimedOut,
            Self::InternalError { .. } => ExecutionStatus::InternalError,
        }
    }

    /// The user-facing text for this outcome.
    pub fn output_text(&self) -> String {
        match self {
            Self::Success { stdout } => stdout.clone(),
            Self::Failure { stderr, .. } => stderr.clone(),
            Self::TimedOut => TIMED_OUT_MESSAGE.to_string(),
            Self::InternalError { message } => {
                format!("An unexpected error occurred: {message}")
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_per_variant() {
        let ok = ExecutionResult::Success { stdout: "hi\n".into() };
        assert_eq!(ok.output_text(), "hi\n");

        let failed = ExecutionResult::Failure {
            stderr: "Traceback".into(),
            exit_code: Some(1),
        };
        assert_eq!(failed.output_text(), "Traceback");

        assert_eq!(ExecutionResult::TimedOut.output_text(), "Execution timed out.");

        let internal = ExecutionResult::InternalError {
            message: "no such file".into(),
        };
        assert_eq!(
            internal.output_text(),
            "An unexpected error occurred: no such file"
        );
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionResult::TimedOut.status()).unwrap();
        assert_eq!(json, "\"timed_out\"");
        let json = serde_json::to_string(&ExecutionStatus::InternalError).unwrap();
        assert_eq!(json, "\"internal_error\"");
    }

    #[test]
    fn request_defaults_missing_code() {
        let req: ExecutionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.code.is_empty());
    }
}
