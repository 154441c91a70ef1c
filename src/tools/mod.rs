//! Security tool adapters.
//!
//! # Data Flow
//! ```text
//! POST /api/tools/{tool} JSON body
//!     → ToolRequest (unknown fields rejected)
//!     → adapters.rs (sanitize each field, build argv from fixed flags)
//!     → runner.rs (spawn without a shell, timeout, kill on drop)
//!     → ToolOutput (stdout only, truncated)
//! ```
//!
//! # Design Decisions
//! - Arguments always travel as a discrete vector; no shell is involved
//! - stderr is logged server-side and never returned to the client
//! - A bounded semaphore caps concurrent tool processes

pub mod adapters;
pub mod runner;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use adapters::{GobusterAdapter, NmapAdapter, ToolAdapter};
pub use runner::ToolRunner;

/// The tools this gateway knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Nmap,
    Gobuster,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Nmap => "nmap",
            ToolKind::Gobuster => "gobuster",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nmap" => Ok(ToolKind::Nmap),
            "gobuster" => Ok(ToolKind::Gobuster),
            _ => Err(()),
        }
    }
}

/// Body of a tool invocation. Which fields are required depends on the tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolRequest {
    pub target: Option<String>,
    pub scan_type: Option<String>,
    pub url: Option<String>,
    pub wordlist: Option<String>,
}

/// Relayed result of a finished tool process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: String,
    pub exit_code: Option<i32>,
    pub output: String,
    pub truncated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool `{0}` is disabled")]
    Disabled(ToolKind),
    #[error("all tool slots are busy")]
    Busy,
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool did not finish within {0:?}")]
    Timeout(Duration),
    #[error("io error while collecting output: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_parse() {
        assert_eq!("nmap".parse::<ToolKind>(), Ok(ToolKind::Nmap));
        assert_eq!("gobuster".parse::<ToolKind>(), Ok(ToolKind::Gobuster));
        assert!("bash".parse::<ToolKind>().is_err());
        assert!("NMAP".parse::<ToolKind>().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = serde_json::from_str::<ToolRequest>(r#"{"target":"8.8.8.8","args":"-oN /tmp/x"}"#);
        assert!(err.is_err());
        let ok: ToolRequest = serde_json::from_str(r#"{"target":"8.8.8.8"}"#).unwrap();
        assert_eq!(ok.target.as_deref(), Some("8.8.8.8"));
    }
}
