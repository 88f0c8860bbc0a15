// Docker container row as reported in each snapshot

use serde::{Deserialize, Serialize};

/// Container state as the server renders it (`docker ps` style strings).
/// `id` is the identity key; every other field may change between snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    #[serde(default)]
    pub names: String,
    #[serde(default)]
    pub image: String,
    pub status: String,
    #[serde(default)]
    pub ports: String,
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
}

impl ContainerState {
    /// Running iff the status text starts with "up " (case-insensitive), e.g. "Up 3 hours".
    pub fn is_running(&self) -> bool {
        self.status
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("up "))
    }

    /// True when the name or image contains `marker`.
    pub fn matches(&self, marker: &str) -> bool {
        self.names.contains(marker) || self.image.contains(marker)
    }
}
