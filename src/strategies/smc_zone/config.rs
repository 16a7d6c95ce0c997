//! SMC Zone Strategy Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmcZoneConfig {
    /// Require the close inside the zone; otherwise a wick into it is enough
    /// (default: false)
    pub require_close_inside: bool,
}
