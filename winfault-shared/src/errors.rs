use thiserror::Error;

/// Common error types for the winfault agent.
#[derive(Error, Debug)]
pub enum FaultError {
    #[error("invalid hostname: '{0}'")]
    InvalidHostname(String),

    #[error("could not resolve hostnames: '{0}'")]
    UnresolvableHostname(String),

    #[error("invalid network bandwidth: {0}")]
    InvalidBandwidth(String),

    #[error("duration must be greater / equal than 1s")]
    InvalidDuration,

    #[error("invalid port range: '{0}'")]
    InvalidPortRange(String),

    #[error("percentage must be between 1 and 100, got {0}")]
    InvalidPercentage(u32),

    #[error("invalid cidr: '{0}'")]
    InvalidCidr(String),

    #[error("target {target} overlaps restricted endpoint {endpoint}")]
    TargetOverlapsRestrictedEndpoint { target: String, endpoint: String },

    #[error("running multiple network attacks at the same time is not supported")]
    ConflictingAttack,

    #[error("windivert service did not reach the running state in time")]
    EngineDidNotStart,

    #[error("windivert service did not reach the stopped state in time")]
    EngineDidNotStop,

    #[error("QoS command failed: {message}")]
    QosCommandFailed { message: String },

    #[error("failed to compile packet filter: {message}")]
    FilterCompileFailed { message: String },

    #[error("service control error: {message}")]
    ServiceControl { message: String },

    #[error("{}", format_multiple(.0))]
    Multiple(Vec<FaultError>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FaultError {
    /// Short taxonomic kind, used as the title of HTTP error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            FaultError::InvalidHostname(_) => "InvalidHostname",
            FaultError::UnresolvableHostname(_) => "UnresolvableHostname",
            FaultError::InvalidBandwidth(_) => "InvalidBandwidth",
            FaultError::InvalidDuration => "InvalidDuration",
            FaultError::InvalidPortRange(_) => "InvalidPortRange",
            FaultError::InvalidPercentage(_) => "InvalidPercentage",
            FaultError::InvalidCidr(_) => "InvalidCidr",
            FaultError::TargetOverlapsRestrictedEndpoint { .. } => {
                "TargetOverlapsRestrictedEndpoint"
            }
            FaultError::ConflictingAttack => "ConflictingAttack",
            FaultError::EngineDidNotStart => "EngineDidNotStart",
            FaultError::EngineDidNotStop => "EngineDidNotStop",
            FaultError::QosCommandFailed { .. } => "QosCommandFailed",
            FaultError::FilterCompileFailed { .. } => "FilterCompileFailed",
            FaultError::ServiceControl { .. } => "ServiceControl",
            FaultError::Multiple(_) => "MultipleErrors",
            FaultError::Io(_) => "IoError",
            FaultError::Serialization(_) => "SerializationError",
        }
    }

    /// Joins `next` onto an already collected error, flattening nested
    /// `Multiple` variants so no partial failure is dropped.
    pub fn join(acc: Option<FaultError>, next: FaultError) -> FaultError {
        match acc {
            None => next,
            Some(FaultError::Multiple(mut errs)) => {
                errs.push(next);
                FaultError::Multiple(errs)
            }
            Some(prev) => FaultError::Multiple(vec![prev, next]),
        }
    }
}

fn format_multiple(errors: &[FaultError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_attack_message_is_stable() {
        assert_eq!(
            FaultError::ConflictingAttack.to_string(),
            "running multiple network attacks at the same time is not supported"
        );
    }

    #[test]
    fn join_flattens_multiple() {
        let joined = FaultError::join(
            Some(FaultError::join(
                Some(FaultError::InvalidDuration),
                FaultError::ConflictingAttack,
            )),
            FaultError::EngineDidNotStart,
        );
        match joined {
            FaultError::Multiple(errs) => assert_eq!(errs.len(), 3),
            other => panic!("expected Multiple, got {other}"),
        }
    }

    #[test]
    fn multiple_display_joins_messages() {
        let err = FaultError::Multiple(vec![
            FaultError::InvalidDuration,
            FaultError::EngineDidNotStop,
        ]);
        let text = err.to_string();
        assert!(text.contains("duration must be greater / equal than 1s"));
        assert!(text.contains("stopped state"));
    }
}
