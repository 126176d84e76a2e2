use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ARQ algorithm used for a transfer.
///
/// On the command line the protocol is selected by number (`0` = SnW,
/// `1` = GBN); scenario and config files use the snake_case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    StopAndWait,
    GoBackN,
}

impl Protocol {
    pub fn short_name(&self) -> &'static str {
        match self {
            Protocol::StopAndWait => "SnW",
            Protocol::GoBackN => "GBN",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "snw" | "stop_and_wait" => Ok(Protocol::StopAndWait),
            "1" | "gbn" | "go_back_n" => Ok(Protocol::GoBackN),
            other => Err(format!(
                "unknown protocol '{other}' (expected 0 for SnW or 1 for GBN)"
            )),
        }
    }
}
