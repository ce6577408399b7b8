use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a single execution attempt.
///
/// Format: `run_<YYYYMMDD>_<HHMMSS>_<suffix>`. The suffix is a random
/// 4-hex-char fragment rather than a pid tail, so two runs started within
/// the same second cannot collide in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        let now = Local::now();
        let suffix: String = Uuid::new_v4().simple().to_string()[..4].to_string();
        Self(format!("run_{}_{}", now.format("%Y%m%d_%H%M%S"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
