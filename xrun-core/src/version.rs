// SPDX-License-Identifier: Apache-2.0

//! The contract version the child emit library and this orchestrator must
//! agree on. Bumping this is a breaking wire change.

/// Compiled-in contract version string. Every [`crate::EventEnvelope`] must
/// carry a matching value or the run is classified
/// [`crate::OutcomeStatus::VersionMismatch`].
pub const CONTRACT_VERSION: &str = "1.0.0";

/// Builds the actionable message surfaced to the user on a version mismatch.
pub fn mismatch_message(got: &str) -> String {
    format!(
        "contract version mismatch: child emitted `{got}`, orchestrator expects \
         `{CONTRACT_VERSION}`. Align the emit library version with the orchestrator \
         (or vice versa) and re-run."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_names_both_versions() {
        let msg = mismatch_message("0.9.0");
        assert!(msg.contains("0.9.0"));
        assert!(msg.contains(CONTRACT_VERSION));
    }
}
