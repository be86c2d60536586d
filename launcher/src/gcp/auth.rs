//! Application-default credential handling.
//!
//! Tokens come from the user's local `gcloud` installation rather than a
//! service-account file: the launcher is a desktop tool and rides on
//! whatever `gcloud auth application-default login` set up.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::errors::LauncherError;

/// Actionable remediation shown whenever ADC is missing or expired.
pub const ADC_REMEDIATION: &str =
    "GCP credentials not configured. Run: gcloud auth application-default login";

/// Bound on the token helper; `gcloud` normally answers in well under a second.
const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Substrings that identify a missing/broken application-default credential
/// in provider and gcloud error output.
const CREDENTIAL_ERROR_MARKERS: &[&str] = &[
    "Could not load the default credentials",
    "NO_ADC_FOUND",
    "default credentials were not found",
    "application-default login",
    "Reauthentication required",
];

/// Whether an error message indicates a credential problem (as opposed to a
/// network or API failure).
pub fn is_credential_error(message: &str) -> bool {
    CREDENTIAL_ERROR_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Map a backend error message to the remediation string when it is a
/// credential problem, passing it through untouched otherwise.
pub fn describe_backend_error(message: &str) -> String {
    if is_credential_error(message) {
        ADC_REMEDIATION.to_string()
    } else {
        message.to_string()
    }
}

/// Fetch a bearer token for the Google REST APIs from the local gcloud ADC.
pub async fn fetch_access_token() -> Result<String, LauncherError> {
    let output = Command::new("gcloud")
        .args(["auth", "application-default", "print-access-token"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(TOKEN_TIMEOUT, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(LauncherError::CredentialError(format!(
                "Could not run gcloud: {}",
                e
            )))
        }
        Err(_) => {
            return Err(LauncherError::CredentialError(
                "Timed out waiting for gcloud to produce an access token".to_string(),
            ))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_credential_error(&stderr) {
            return Err(LauncherError::CredentialError(ADC_REMEDIATION.to_string()));
        }
        return Err(LauncherError::CredentialError(format!(
            "gcloud could not produce an access token: {}",
            stderr.trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(LauncherError::CredentialError(ADC_REMEDIATION.to_string()));
    }
    Ok(token)
}
