// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Failures of the controller client lifecycle and of its periodic jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// `start` was called on a client whose worker is already running
    AlreadyStarted,
    /// `start` was called on a client that has been killed
    Stopped,
    SpawnFailed(String),
    HandleMutexPoisoned,
    WorkerPanicked(String),
    /// The config endpoint answered with a body that is not a valid config document
    MalformedConfig(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "controller worker already started"),
            Self::Stopped => write!(f, "controller client was killed and cannot be restarted"),
            Self::SpawnFailed(msg) => write!(f, "failed to spawn controller worker: {msg}"),
            Self::HandleMutexPoisoned => write!(f, "handle mutex poisoned"),
            Self::WorkerPanicked(msg) => write!(f, "controller worker panicked: {msg}"),
            Self::MalformedConfig(msg) => write!(f, "malformed config document: {msg}"),
        }
    }
}

impl std::error::Error for ControllerError {}

#[cfg(test)]
mod tests {
    use super::ControllerError;

    #[test]
    fn test_controller_error_display() {
        assert_eq!(
            ControllerError::MalformedConfig("expected value".to_string()).to_string(),
            "malformed config document: expected value"
        );
        assert_eq!(
            ControllerError::Stopped.to_string(),
            "controller client was killed and cannot be restarted"
        );

        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(ControllerError::WorkerPanicked("boom".to_string()));
        assert_eq!(boxed.to_string(), "controller worker panicked: boom");
    }
}
