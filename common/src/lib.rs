pub mod annotations;
pub mod labels;
pub mod shutdown;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Call once at process start, before anything else.
///
/// Mirrors the color-override toggle every other binary in this family uses:
/// honor `DISABLE_COLORS` so log output stays parseable when piped or run in
/// CI, where terminal escape codes just add noise.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_default()
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
}

/// Writes a readiness marker file read by the container's readiness probe.
pub fn signal_ready() {
    let path = std::env::var("READY_FILE").unwrap_or_else(|_| "/tmp/ready".to_string());
    if let Err(err) = std::fs::write(&path, "ready") {
        eprintln!("failed to write readiness file {path}: {err}");
    }
}

/// Hex-encoded SHA-256 digest of a spec object's canonical JSON form, stored
/// on created children under [`annotations::SPEC_HASH`]. Informational only
/// — children are immutable once created, so nothing currently reconciles
/// against drift between this hash and the live template.
pub fn hash_spec<T: Serialize>(spec: &T) -> String {
    let bytes = serde_json::to_vec(spec).expect("spec types are always serializable");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}
