//! Environment scraping over a rendered MachineConfig.
//!
//! The ignition payload is never parsed: a value is whatever follows the
//! first `KEY=` up to a newline, quote, space or backslash. The payload is the
//! JSON form of `spec.config`, where a backslash only starts an escape such
//! as `\n` or `\"`.

use crate::error::EngineError;
use crds::{BootModuleConfigSpec, MachineConfig};
use std::fmt;
use tracing::debug;

const TERMINATORS: &[u8] = b"\n\" \\";

/// Return the value of the first `key=` assignment in `payload`.
///
/// Besides newline, quote and space, a backslash also ends the value: in the
/// JSON-encoded payload a unit's `Environment="K=v"\n` arrives as `K=v\"\n`.
pub fn extract_env_var(payload: &[u8], key: &str) -> Option<String> {
    let needle = format!("{}=", key);
    let needle = needle.as_bytes();

    let start = payload
        .windows(needle.len())
        .position(|window| window == needle)?
        + needle.len();
    let rest = &payload[start..];
    let end = rest
        .iter()
        .position(|b| TERMINATORS.contains(b))
        .unwrap_or(rest.len());

    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// What a scraped value must look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvExpectation {
    Equals(String),
    NonEmpty,
    /// Comma-separated list holding every one of these entries
    ContainsAll(Vec<String>),
}

impl EnvExpectation {
    pub fn holds(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::NonEmpty => !value.is_empty(),
            Self::ContainsAll(wanted) => {
                let listed: Vec<&str> = value.split(',').map(str::trim).collect();
                wanted.iter().all(|entry| listed.contains(&entry.as_str()))
            }
        }
    }
}

impl fmt::Display for EnvExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(expected) => write!(f, "== {:?}", expected),
            Self::NonEmpty => write!(f, "non-empty"),
            Self::ContainsAll(wanted) => write!(f, "lists all of {:?}", wanted),
        }
    }
}

/// Variables the rendered MachineConfig must carry for `spec`, in check order.
pub fn expected_env(spec: &BootModuleConfigSpec) -> Vec<(&'static str, EnvExpectation)> {
    let mut expected = vec![
        (
            "KERNEL_MODULE_IMAGE",
            EnvExpectation::Equals(spec.kernel_module_image.clone()),
        ),
        (
            "KERNEL_MODULE",
            EnvExpectation::Equals(spec.kernel_module_name.clone()),
        ),
    ];

    let worker = match spec.worker_image.as_deref().filter(|image| !image.is_empty()) {
        Some(image) => EnvExpectation::Equals(image.to_string()),
        None => EnvExpectation::NonEmpty,
    };
    expected.push(("WORKER_IMAGE", worker));

    if !spec.in_tree_modules().is_empty() {
        expected.push((
            "IN_TREE_MODULES_TO_REMOVE",
            EnvExpectation::ContainsAll(spec.in_tree_modules().to_vec()),
        ));
    }

    if let Some(path) = spec.firmware_files_path.as_deref().filter(|p| !p.is_empty()) {
        expected.push(("FIRMWARE_FILES_PATH", EnvExpectation::Equals(path.to_string())));
    }

    expected
}

/// Check every expected variable against the MachineConfig payload.
pub fn verify_env(mc: &MachineConfig, spec: &BootModuleConfigSpec) -> Result<(), EngineError> {
    let payload = mc.payload();
    let mc_name = mc.metadata.name.as_deref().unwrap_or_default();

    for (key, expectation) in expected_env(spec) {
        let value = extract_env_var(&payload, key).ok_or_else(|| {
            EngineError::assertion(
                "verify_env",
                format!("MachineConfig {} has no {} assignment", mc_name, key),
            )
        })?;

        if !expectation.holds(&value) {
            return Err(EngineError::assertion(
                "verify_env",
                format!(
                    "MachineConfig {}: {}={:?}, expected {}",
                    mc_name, key, value, expectation
                ),
            ));
        }
        debug!(machine_config = mc_name, key, value = %value, "Environment variable verified");
    }

    Ok(())
}
