//! Failure classification for execution outcomes.
//!
//! A pure decision table over the adapter's output. The trigger substrings
//! and their precedence are a behavioral contract with the container runtime
//! and git wording; keep any change confined to this module.

use crate::models::{FailureReason, TargetStatus, TIMEOUT_EXIT_CODE};

use super::docker::{RunError, RunOutcome};

/// Emitted by the Docker CLI when the image reference cannot be resolved.
const IMAGE_MISSING_MARKER: &str = "unable to find image";
/// Emitted by the Docker CLI when the daemon is unreachable.
const DAEMON_MARKER: &str = "docker daemon";
/// Emitted by git when a clone hits an interactive credential prompt.
const AUTH_PROMPT_MARKER: &str = "Username for";
/// Emitted by git when the clone step began.
const CLONE_STARTED_MARKER: &str = "Cloning into";

/// Terminal classification of one execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: TargetStatus,
    pub reason: Option<FailureReason>,
    pub exit_code: i32,
}

/// Map an execution outcome to a target status and reason code.
///
/// Evaluated in priority order, first match wins:
/// 1. deadline exceeded
/// 2. container image missing
/// 3. container daemon unreachable
/// 4. interactive git credential prompt
/// 5. clone began but the invocation failed
/// 6. tests failed (non-zero exit)
/// 7. any other invocation error
/// 8. clean exit
pub fn classify(outcome: &RunOutcome) -> Verdict {
    if outcome.timed_out {
        return Verdict {
            status: TargetStatus::Failed,
            reason: Some(FailureReason::Timeout),
            exit_code: TIMEOUT_EXIT_CODE,
        };
    }

    let error = match &outcome.error {
        Some(error) => error,
        None => {
            return if outcome.exit_code == 0 {
                Verdict {
                    status: TargetStatus::Passed,
                    reason: None,
                    exit_code: 0,
                }
            } else {
                Verdict {
                    status: TargetStatus::Failed,
                    reason: Some(FailureReason::TestsFailed),
                    exit_code: outcome.exit_code,
                }
            };
        }
    };

    // The Docker CLI reports these conditions on stderr, so the haystack is
    // the error text together with the captured log. Case folded: the CLI
    // capitalizes "Unable to find image"/"Docker daemon" inconsistently
    // across versions.
    let haystack = format!("{}\n{}", error.message(), outcome.log).to_lowercase();

    let (status, reason) = if haystack.contains(IMAGE_MISSING_MARKER) {
        (TargetStatus::Error, FailureReason::DockerImageMissing)
    } else if haystack.contains(DAEMON_MARKER) {
        (TargetStatus::Error, FailureReason::DockerDaemonError)
    } else if outcome.log.contains(AUTH_PROMPT_MARKER) {
        (TargetStatus::Error, FailureReason::GitAuthError)
    } else {
        match error {
            RunError::NonZeroExit(_) => {
                if outcome.log.contains(CLONE_STARTED_MARKER) {
                    (TargetStatus::Failed, FailureReason::GitCloneFailed)
                } else {
                    (TargetStatus::Failed, FailureReason::TestsFailed)
                }
            }
            RunError::Spawn(_) => (TargetStatus::Error, FailureReason::DockerError),
        }
    };

    Verdict {
        status,
        reason: Some(reason),
        exit_code: outcome.exit_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i32, log: &str, timed_out: bool, error: Option<RunError>) -> RunOutcome {
        RunOutcome {
            exit_code,
            log: log.to_string(),
            timed_out,
            error,
        }
    }

    #[test]
    fn test_clean_exit_passes() {
        let v = classify(&outcome(0, "STDOUT:\nok\nSTDERR:\n", false, None));
        assert_eq!(v.status, TargetStatus::Passed);
        assert_eq!(v.reason, None);
        assert_eq!(v.exit_code, 0);
    }

    #[test]
    fn test_timeout_forces_sentinel_exit_code() {
        let v = classify(&outcome(
            TIMEOUT_EXIT_CODE,
            "STDOUT:\npartial output\nSTDERR:\n",
            true,
            None,
        ));
        assert_eq!(v.status, TargetStatus::Failed);
        assert_eq!(v.reason, Some(FailureReason::Timeout));
        assert_eq!(v.exit_code, TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn test_image_missing_is_error_not_failed() {
        let v = classify(&outcome(
            125,
            "STDOUT:\n\nSTDERR:\nUnable to find image 'multiarch-test-runner:riscv64' locally\n",
            false,
            Some(RunError::NonZeroExit(125)),
        ));
        assert_eq!(v.status, TargetStatus::Error);
        assert_eq!(v.reason, Some(FailureReason::DockerImageMissing));
    }

    #[test]
    fn test_daemon_unreachable() {
        let v = classify(&outcome(
            1,
            "STDOUT:\n\nSTDERR:\nCannot connect to the Docker daemon at unix:///var/run/docker.sock\n",
            false,
            Some(RunError::NonZeroExit(1)),
        ));
        assert_eq!(v.status, TargetStatus::Error);
        assert_eq!(v.reason, Some(FailureReason::DockerDaemonError));
    }

    #[test]
    fn test_git_auth_prompt() {
        let v = classify(&outcome(
            128,
            "STDOUT:\nUsername for 'https://github.com':\nSTDERR:\n",
            false,
            Some(RunError::NonZeroExit(128)),
        ));
        assert_eq!(v.status, TargetStatus::Error);
        assert_eq!(v.reason, Some(FailureReason::GitAuthError));
    }

    #[test]
    fn test_clone_started_then_failure() {
        let v = classify(&outcome(
            128,
            "STDOUT:\n\nSTDERR:\nCloning into 'app'...\nfatal: early EOF\n",
            false,
            Some(RunError::NonZeroExit(128)),
        ));
        assert_eq!(v.status, TargetStatus::Failed);
        assert_eq!(v.reason, Some(FailureReason::GitCloneFailed));
        assert_eq!(v.exit_code, 128);
    }

    #[test]
    fn test_nonzero_exit_without_markers_is_tests_failed() {
        let v = classify(&outcome(
            2,
            "STDOUT:\n1 test failed\nSTDERR:\n",
            false,
            Some(RunError::NonZeroExit(2)),
        ));
        assert_eq!(v.status, TargetStatus::Failed);
        assert_eq!(v.reason, Some(FailureReason::TestsFailed));
        assert_eq!(v.exit_code, 2);
    }

    #[test]
    fn test_spawn_failure_is_docker_error() {
        let v = classify(&outcome(
            -1,
            "STDOUT:\n\nSTDERR:\n",
            false,
            Some(RunError::Spawn("No such file or directory (os error 2)".into())),
        ));
        assert_eq!(v.status, TargetStatus::Error);
        assert_eq!(v.reason, Some(FailureReason::DockerError));
    }

    #[test]
    fn test_nonzero_exit_with_no_error_field() {
        let v = classify(&outcome(3, "STDOUT:\n\nSTDERR:\n", false, None));
        assert_eq!(v.status, TargetStatus::Failed);
        assert_eq!(v.reason, Some(FailureReason::TestsFailed));
    }

    #[test]
    fn test_timeout_beats_other_markers() {
        let v = classify(&outcome(
            TIMEOUT_EXIT_CODE,
            "STDOUT:\n\nSTDERR:\nUnable to find image 'x' locally\n",
            true,
            None,
        ));
        assert_eq!(v.reason, Some(FailureReason::Timeout));
    }

    #[test]
    fn test_image_missing_beats_daemon_marker() {
        let v = classify(&outcome(
            125,
            "STDOUT:\n\nSTDERR:\nUnable to find image 'x' locally: error from Docker daemon\n",
            false,
            Some(RunError::NonZeroExit(125)),
        ));
        assert_eq!(v.reason, Some(FailureReason::DockerImageMissing));
    }

    #[test]
    fn test_auth_prompt_beats_clone_failure() {
        let v = classify(&outcome(
            128,
            "STDOUT:\nCloning into 'app'...\nUsername for 'https://github.com':\nSTDERR:\n",
            false,
            Some(RunError::NonZeroExit(128)),
        ));
        assert_eq!(v.reason, Some(FailureReason::GitAuthError));
    }

    #[test]
    fn test_auth_prompt_requires_an_invocation_error() {
        // A clean exit is a pass even when the log happens to echo the marker.
        let v = classify(&outcome(
            0,
            "STDOUT:\ngrep found: Username for\nSTDERR:\n",
            false,
            None,
        ));
        assert_eq!(v.status, TargetStatus::Passed);
    }
}
