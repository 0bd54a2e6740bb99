use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TargetMissingParameter,
    TargetCycleDetected,
    TargetNotFound,
    TargetDuplicate,

    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    ExternalCommandFailed,
    ExternalHttpFailed,
    ExternalBatchFailed,
    ExternalServiceReadyTimeout,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TargetMissingParameter => "target.missing_parameter",
            ErrorCode::TargetCycleDetected => "target.cycle_detected",
            ErrorCode::TargetNotFound => "target.not_found",
            ErrorCode::TargetDuplicate => "target.duplicate",

            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ExternalCommandFailed => "external.command_failed",
            ErrorCode::ExternalHttpFailed => "external.http_failed",
            ErrorCode::ExternalBatchFailed => "external.batch_failed",
            ErrorCode::ExternalServiceReadyTimeout => "external.service_ready_timeout",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingParameterDetails {
    pub target: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleDetails {
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailureItem {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn missing_parameter(target: impl Into<String>, parameters: Vec<String>) -> Self {
        let target = target.into();
        let message = format!(
            "Target '{}' is missing required parameter(s): {}",
            target,
            parameters.join(", ")
        );
        let hint = format!(
            "Pass them with --param <Name>=<value> or set {}",
            parameters
                .iter()
                .map(|p| crate::params::env_var_name(p))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self::new(
            ErrorCode::TargetMissingParameter,
            message,
            to_details(MissingParameterDetails { target, parameters }),
        )
        .with_hint(hint)
    }

    pub fn cycle_detected(members: Vec<String>) -> Self {
        let message = format!("Dependency cycle detected: {}", members.join(" -> "));
        Self::new(
            ErrorCode::TargetCycleDetected,
            message,
            to_details(CycleDetails { members }),
        )
    }

    pub fn target_not_found(id: impl Into<String>, referenced_by: Option<String>) -> Self {
        let id = id.into();
        let message = match &referenced_by {
            Some(source) => format!("Target '{}' referenced by '{}' is not declared", id, source),
            None => format!("Target '{}' is not declared", id),
        };
        Self::new(
            ErrorCode::TargetNotFound,
            message,
            to_details(NotFoundDetails { id, referenced_by }),
        )
        .with_hint("Run 'shipwright list' to see available targets")
    }

    pub fn target_duplicate(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::TargetDuplicate,
            format!("Target '{}' is declared more than once", id),
            to_details(NotFoundDetails {
                id,
                referenced_by: None,
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in configuration file {}", path),
            serde_json::json!({ "path": path, "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for '{}': {}", key, problem),
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            problem.clone(),
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem,
                id,
            }),
        )
    }

    pub fn command_failed(context: &str, details: CommandFailedDetails) -> Self {
        let reason = if details.stderr.trim().is_empty() {
            details.stdout.trim().to_string()
        } else {
            details.stderr.trim().to_string()
        };
        Self::new(
            ErrorCode::ExternalCommandFailed,
            format!("{} failed (exit {}): {}", context, details.exit_code, reason),
            to_details(details),
        )
    }

    pub fn http_failed(context: impl Into<String>, status: Option<u16>, body: impl Into<String>) -> Self {
        let context = context.into();
        let message = match status {
            Some(code) => format!("{} failed: HTTP {}", context, code),
            None => format!("{} failed", context),
        };
        Self::new(
            ErrorCode::ExternalHttpFailed,
            message,
            serde_json::json!({ "status": status, "body": body.into() }),
        )
    }

    pub fn batch_failed(label: impl Into<String>, failures: Vec<BatchFailureItem>) -> Self {
        let label = label.into();
        let summary = failures
            .iter()
            .map(|f| format!("{} ({})", f.id, f.error))
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(
            ErrorCode::ExternalBatchFailed,
            format!("{}: {} item(s) failed: {}", label, failures.len(), summary),
            serde_json::json!({ "label": label, "failures": failures }),
        )
    }

    pub fn service_ready_timeout(service: impl Into<String>, waited_secs: u64, last_status: &str) -> Self {
        let service = service.into();
        Self::new(
            ErrorCode::ExternalServiceReadyTimeout,
            format!(
                "Service '{}' was not ready after {}s (last status: {})",
                service, waited_secs, last_status
            ),
            serde_json::json!({
                "service": service,
                "waitedSecs": waited_secs,
                "lastStatus": last_status,
            }),
        )
        .with_hint("Raise serviceReady.timeoutSecs in shipwright.json if provisioning is slow")
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalErrorDetails {
            error: error.into(),
            context: context.clone(),
        });
        let message = match context {
            Some(ctx) => format!("IO error: {}", ctx),
            None => "IO error".to_string(),
        };
        Self::new(ErrorCode::InternalIoError, message, details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalErrorDetails {
            error: error.into(),
            context,
        });
        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    /// Attribute the error to the target that raised it.
    pub fn in_target(mut self, target: &str) -> Self {
        if !self.message.starts_with(&format!("Target '{}'", target)) {
            self.message = format!("Target '{}' failed: {}", target, self.message);
        }
        if let Value::Object(map) = &mut self.details {
            map.insert("target".to_string(), Value::String(target.to_string()));
        }
        self
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }
}
