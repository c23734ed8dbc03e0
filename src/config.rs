//! Connector identity and configuration-string (de)serialization (spec
//! §6 "Identity").
//!
//! Grounded on the teacher's `mnt::mount_options::MountOption` parsing:
//! a small hand-rolled parser for a compact, semicolon-delimited option
//! string, no serde involved since the format isn't JSON/TOML-shaped.

use crate::error::{BypassError, Result};

/// Integer identity this connector presents to the host (spec §6).
pub const CONNECTOR_ID: i64 = 518;
/// String identity this connector presents to the host (spec §6).
pub const CONNECTOR_NAME: &str = "bypass";

/// Parsed form of the connector's configuration blob:
/// `under_vol=<u>;under_info={<blob>}`, where `<u>` identifies the
/// underlying connector and `<blob>` is that connector's own opaque
/// configuration string, carried through unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub under_vol: i64,
    pub under_info: String,
}

impl ConnectorConfig {
    pub fn new(under_vol: i64, under_info: impl Into<String>) -> Self {
        Self {
            under_vol,
            under_info: under_info.into(),
        }
    }

    /// Parse `under_vol=<u>;under_info={<blob>}`. The blob itself may
    /// contain anything except an unescaped `}` — this connector never
    /// interprets it, only the underlying connector does.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (vol_part, info_part) = s.split_once(';').ok_or_else(|| {
            BypassError::Config(format!("missing ';' separator in configuration string: {s:?}"))
        })?;

        let vol_part = vol_part.trim();
        let vol_str = vol_part.strip_prefix("under_vol=").ok_or_else(|| {
            BypassError::Config(format!("expected 'under_vol=<id>', got {vol_part:?}"))
        })?;
        let under_vol = vol_str
            .parse::<i64>()
            .map_err(|e| BypassError::Config(format!("invalid under_vol identifier {vol_str:?}: {e}")))?;

        let info_part = info_part.trim();
        let blob = info_part
            .strip_prefix("under_info={")
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| {
                BypassError::Config(format!("expected 'under_info={{<blob>}}', got {info_part:?}"))
            })?;

        Ok(Self {
            under_vol,
            under_info: blob.to_string(),
        })
    }

    pub fn render(&self) -> String {
        format!("under_vol={};under_info={{{}}}", self.under_vol, self.under_info)
    }
}
