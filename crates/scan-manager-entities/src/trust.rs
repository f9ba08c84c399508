// crates/scan-manager-entities/src/trust.rs
// ============================================================================
// Module: Signature Trust Adapter
// Description: Detached-signature verification through the external gpg
//              binary.
// Purpose: Derive trust levels for agent installers and report formats
//          from gpg's exit status.
// Dependencies: scan-manager-core, tempfile
// ============================================================================

//! ## Overview
//! Verification spawns `gpg --batch --quiet --no-tty --verify <sig>
//! <content>` against temp files and maps the exit status: 0 is trusted,
//! 1 is untrusted, anything else is unknown. A verifier that cannot run at
//! all reports the error level. Verification failure never blocks entity
//! creation; it only shapes the stored trust column.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use scan_manager_core::ToolCommand;
use scan_manager_core::ToolExit;
use scan_manager_core::TrustLevel;
use tempfile::TempDir;
use tracing::warn;

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Detached-signature verifier bound to a gpg binary.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    /// Path to the gpg binary.
    gpg: PathBuf,
    /// Timeout for one verification run.
    timeout: Duration,
}

impl SignatureVerifier {
    /// Creates a verifier for `gpg` with the given timeout.
    #[must_use]
    pub fn new(gpg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            gpg: gpg.into(),
            timeout,
        }
    }

    /// Verifies `signature` over `content`.
    ///
    /// Exit 0 maps to yes, exit 1 to no, any other exit to unknown. A
    /// verifier that cannot run (spawn failure, timeout, temp-file
    /// trouble) reports the error level and logs the cause.
    #[must_use]
    pub fn verify_detached(&self, content: &[u8], signature: &[u8]) -> TrustLevel {
        let Ok(dir) = TempDir::new() else {
            warn!("signature verification temp dir unavailable");
            return TrustLevel::Error;
        };
        let content_path = dir.path().join("content");
        let signature_path = dir.path().join("content.asc");
        if fs::write(&content_path, content).is_err()
            || fs::write(&signature_path, signature).is_err()
        {
            warn!("signature verification temp files unwritable");
            return TrustLevel::Error;
        }
        let run = ToolCommand::new(&self.gpg, self.timeout)
            .arg("--batch")
            .arg("--quiet")
            .arg("--no-tty")
            .arg("--verify")
            .arg(signature_path.display().to_string())
            .arg(content_path.display().to_string())
            .run();
        match run {
            Ok(output) => match output.exit {
                ToolExit::Code(0) => TrustLevel::Yes,
                ToolExit::Code(1) => TrustLevel::No,
                ToolExit::Code(_) | ToolExit::Signal => TrustLevel::Unknown,
            },
            Err(err) => {
                warn!(error = %err, "signature verification did not run");
                TrustLevel::Error
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use scan_manager_core::TrustLevel;

    use super::SignatureVerifier;

    #[test]
    fn exit_status_zero_and_one_map_to_yes_and_no() {
        // Stand-in verifiers with fixed exit codes exercise the mapping
        // without a keyring.
        let yes = SignatureVerifier::new("true", Duration::from_secs(5));
        assert_eq!(yes.verify_detached(b"content", b"sig"), TrustLevel::Yes);
        let no = SignatureVerifier::new("false", Duration::from_secs(5));
        assert_eq!(no.verify_detached(b"content", b"sig"), TrustLevel::No);
    }

    #[test]
    fn unrunnable_verifier_reports_error_level() {
        let broken = SignatureVerifier::new("/nonexistent/gpg", Duration::from_secs(1));
        assert_eq!(broken.verify_detached(b"content", b"sig"), TrustLevel::Error);
    }
}
