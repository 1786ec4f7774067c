//! LSP Common Types
//!
//! Positions and ranges as they travel over the wire (0-indexed, UTF-16 columns).

use serde::{Deserialize, Serialize};

/// Position within a document (0-indexed, LSP standard)
///
/// Field order gives the lexicographic ordering used for range checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Clamp signed coordinates reported by external tools into LSP space
    pub fn clamped(line: i64, character: i64) -> Self {
        Self {
            line: clamp_u32(line),
            character: clamp_u32(character),
        }
    }

    /// Move the position down by `offset` lines, saturating at `u32::MAX`
    pub fn shifted(self, offset: u32) -> Self {
        Self {
            line: self.line.saturating_add(offset),
            character: self.character,
        }
    }
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

/// Range within a document; `start <= end` always holds
///
/// Ranges decoded from the wire go through [`Range::new`] as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "WireRange")]
pub struct Range {
    start: Position,
    end: Position,
}

#[derive(Deserialize)]
struct WireRange {
    start: Position,
    end: Position,
}

impl From<WireRange> for Range {
    fn from(wire: WireRange) -> Self {
        Self::new(wire.start, wire.end)
    }
}

impl Range {
    /// Build a range, collapsing it to `start` when `end` precedes it
    pub fn new(start: Position, end: Position) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Convert a single position to a range
    pub fn point(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn end(&self) -> Position {
        self.end
    }

    pub fn shifted(self, offset: u32) -> Self {
        Self {
            start: self.start.shifted(offset),
            end: self.end.shifted(offset),
        }
    }
}

/// Last path segment of a document URI, used as an upload file name
pub fn uri_file_name(uri: &str) -> String {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "document.py".to_string())
}

/// Build a `file://` URI for a local path
pub fn path_to_uri(path: &std::path::Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    url::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("file://{}", absolute.display()))
}
