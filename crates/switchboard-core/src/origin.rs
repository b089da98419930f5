// ABOUTME: Tracks the instantiation path of every tool instance in an agent call graph.
// ABOUTME: Assigns per-parent instantiation indices and renders/parses dotted origin names.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised while rendering or parsing origins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("origin entry {0} has no tool name")]
    MissingToolName(usize),

    #[error("invalid instantiation suffix in origin segment: {0}")]
    InvalidSegment(String),
}

/// One step of an origin path: the tool that was instantiated and which
/// instantiation of that tool (under the same parent) it was.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginEntry {
    pub tool: String,
    #[serde(default)]
    pub instantiation_index: u32,
}

impl OriginEntry {
    pub fn new(tool: impl Into<String>, instantiation_index: u32) -> Self {
        Self {
            tool: tool.into(),
            instantiation_index,
        }
    }

    /// Render this entry as a single dotted-path segment.
    /// Index 0 renders as the bare tool name, later instantiations get a
    /// zero-padded `-NN` suffix.
    fn segment(&self) -> String {
        if self.instantiation_index > 0 {
            format!("{}-{:02}", self.tool, self.instantiation_index)
        } else {
            self.tool.clone()
        }
    }
}

/// The ordered path from the front man to a tool instance.
pub type Origin = Vec<OriginEntry>;

/// Join an origin into its dotted full name, e.g. `front.synonymizer-01`.
///
/// A `./` produced by joining onto an externally-rooted tool name
/// (`/remote_agent`) collapses to `/`.
pub fn get_full_name_from_origin(origin: &[OriginEntry]) -> Result<String, OriginError> {
    let mut segments = Vec::with_capacity(origin.len());
    for (i, entry) in origin.iter().enumerate() {
        if entry.tool.is_empty() {
            return Err(OriginError::MissingToolName(i));
        }
        segments.push(entry.segment());
    }
    Ok(segments.join(".").replace("./", "/"))
}

/// Parse a dotted full name back into an origin.
///
/// Inverse of [`get_full_name_from_origin`] for names that do not themselves
/// contain dots. A `/` that follows a segment starts a new externally-rooted
/// segment.
pub fn origin_from_full_name(full_name: &str) -> Result<Origin, OriginError> {
    if full_name.is_empty() {
        return Ok(Vec::new());
    }

    let mut origin = Vec::new();
    for dotted in full_name.split('.') {
        // "front/remote" came from "front./remote"
        let mut pieces = Vec::new();
        let mut start = 0;
        for (i, c) in dotted.char_indices() {
            if c == '/' && i > start {
                pieces.push(&dotted[start..i]);
                start = i;
            }
        }
        pieces.push(&dotted[start..]);

        for piece in pieces {
            origin.push(parse_segment(piece)?);
        }
    }
    Ok(origin)
}

fn parse_segment(segment: &str) -> Result<OriginEntry, OriginError> {
    if segment.is_empty() {
        return Err(OriginError::InvalidSegment(segment.to_string()));
    }
    if let Some((tool, suffix)) = segment.rsplit_once('-')
        && suffix.len() >= 2
        && suffix.chars().all(|c| c.is_ascii_digit())
    {
        let index: u32 = suffix
            .parse()
            .map_err(|_| OriginError::InvalidSegment(segment.to_string()))?;
        if index > 0 && !tool.is_empty() {
            return Ok(OriginEntry::new(tool, index));
        }
    }
    Ok(OriginEntry::new(segment, 0))
}

/// Newtype used for logging an origin without forcing callers to handle
/// the rendering error.
pub struct DisplayOrigin<'a>(pub &'a [OriginEntry]);

impl fmt::Display for DisplayOrigin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match get_full_name_from_origin(self.0) {
            Ok(name) => f.write_str(&name),
            Err(_) => f.write_str("<invalid origin>"),
        }
    }
}

/// Hands out instantiation indices for one conversation's invocation context.
///
/// The counting table is keyed by the parent's full name plus the new tool
/// name, so repeated visits to the same tool under the same parent get
/// increasing indices (0, 1, 2, ...). A fresh `Origination` starts over.
#[derive(Debug, Default)]
pub struct Origination {
    counts: Mutex<HashMap<String, u32>>,
}

impl Origination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new origin equal to `origin` plus one entry for `agent_name`.
    /// The input is never modified.
    pub async fn add_spec_name_to_origin(
        &self,
        origin: &[OriginEntry],
        agent_name: &str,
    ) -> Result<Origin, OriginError> {
        let parent = get_full_name_from_origin(origin)?;
        let key = format!("{parent}#{agent_name}");

        let index = {
            let mut counts = self.counts.lock().await;
            let slot = counts.entry(key).or_insert(0);
            let index = *slot;
            *slot += 1;
            index
        };

        let mut extended = origin.to_vec();
        extended.push(OriginEntry::new(agent_name, index));
        Ok(extended)
    }

    /// Forget all assigned indices.
    pub async fn reset(&self) {
        self.counts.lock().await.clear();
    }
}
