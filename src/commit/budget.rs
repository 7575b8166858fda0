//! Bounding an arbitrarily large staged diff to a prompt budget.
//!
//! The diff is split into per-file segments at `diff --git` headers. Segments
//! are taken whole, in order, until the next one would overflow; that one is
//! cut at a line boundary and every later file is reduced to an omitted
//! marker naming only its path and change kind. Binary files are always
//! markers. Room for one marker per remaining file is reserved while filling,
//! so no file ever disappears from the output.
//!
//! Markers and the truncation note are charged at the size of the text the
//! prompt renders for them, so the accounted units match the prompt.

use std::fmt;

/// Bytes per estimated token.
pub const BYTES_PER_UNIT: usize = 4;

/// Share of the budget the status summary may take, as a divisor.
pub const STATUS_SHARE_DIVISOR: usize = 4;

const DIFF_HEADER: &str = "diff --git ";

/// Estimated size of `text` in budget units (tokens), rounded up.
pub fn estimate_units(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_UNIT)
}

/// Line standing in for a file whose content was dropped.
pub fn omitted_marker(change_kind: ChangeKind, file_path: &str) -> String {
    format!("[{} file {}: content omitted]\n", change_kind, file_path)
}

/// Line appended after a truncated file's prefix.
pub fn truncation_note(file_path: &str) -> String {
    format!("[... diff of {} truncated to fit the prompt]\n", file_path)
}

/// Units charged for the omitted marker of this file.
pub fn marker_units(change_kind: ChangeKind, file_path: &str) -> usize {
    estimate_units(&omitted_marker(change_kind, file_path))
}

/// Keep as many leading lines of `status` as fit in `max_units`, replacing the
/// rest with a `[N more entries]` line.
pub fn bound_status(status: &str, max_units: usize) -> String {
    let status = status.trim_end();
    if estimate_units(status) <= max_units {
        return status.to_string();
    }

    let lines: Vec<&str> = status.lines().collect();
    // Sized for the largest possible count so the note always fits.
    let reserve = estimate_units(&more_entries(lines.len()));
    let available = max_units.saturating_sub(reserve);

    let mut kept = String::new();
    let mut count = 0;
    for line in &lines {
        if estimate_units(&kept) + estimate_units(line) + 1 > available {
            break;
        }
        kept.push_str(line);
        kept.push('\n');
        count += 1;
    }
    kept.push_str(&more_entries(lines.len() - count));
    kept
}

fn more_entries(n: usize) -> String {
    format!("[{} more entries]", n)
}

/// How a file changed in the staged diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Binary,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Modified => write!(f, "modified"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
            ChangeKind::Binary => write!(f, "binary"),
        }
    }
}

/// The part of a file's diff that made it into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkContent {
    /// The whole segment, headers included.
    Full(String),
    /// A prefix of complete lines of the segment.
    Truncated(String),
    /// Content dropped; only path and change kind remain.
    Omitted,
}

/// One file's contribution to the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffChunk {
    pub file_path: String,
    pub change_kind: ChangeKind,
    pub content: ChunkContent,
}

impl DiffChunk {
    /// Budget units this chunk consumes once rendered into the prompt.
    pub fn units(&self) -> usize {
        match &self.content {
            ChunkContent::Full(text) => estimate_units(text),
            ChunkContent::Truncated(text) => {
                estimate_units(text) + estimate_units(&truncation_note(&self.file_path))
            }
            ChunkContent::Omitted => marker_units(self.change_kind, &self.file_path),
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self.content, ChunkContent::Omitted)
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self.content, ChunkContent::Truncated(_))
    }
}

/// Result of [`bound`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundedDiff {
    pub chunks: Vec<DiffChunk>,
    /// Set only when the budget could not hold one marker per file. File
    /// identity is kept anyway.
    pub over_budget: bool,
}

impl BoundedDiff {
    pub fn total_units(&self) -> usize {
        self.chunks.iter().map(DiffChunk::units).sum()
    }

    /// Whether any file lost content to the budget (binary files excluded).
    pub fn is_reduced(&self) -> bool {
        self.chunks.iter().any(|c| {
            c.is_truncated() || (c.is_omitted() && c.change_kind != ChangeKind::Binary)
        })
    }
}

/// One file's slice of the raw diff.
struct Segment<'a> {
    text: &'a str,
    file_path: String,
    change_kind: ChangeKind,
}

/// Reduce `diff_text` to at most `max_units`, preserving file order and identity.
pub fn bound(diff_text: &str, max_units: usize) -> BoundedDiff {
    let segments = split_segments(diff_text);
    let markers: Vec<usize> = segments
        .iter()
        .map(|s| marker_units(s.change_kind, &s.file_path))
        .collect();

    let mut chunks = Vec::with_capacity(segments.len());
    let mut used = 0usize;
    let mut overflowed = false;

    for (idx, segment) in segments.into_iter().enumerate() {
        let marker = markers[idx];
        let reserve: usize = markers[idx + 1..].iter().sum();

        if overflowed || segment.change_kind == ChangeKind::Binary {
            used += marker;
            chunks.push(omitted(segment));
            continue;
        }

        let available = max_units.saturating_sub(used + reserve);
        let cost = estimate_units(segment.text);
        if cost <= available {
            used += cost;
            chunks.push(DiffChunk {
                file_path: segment.file_path,
                change_kind: segment.change_kind,
                content: ChunkContent::Full(segment.text.to_string()),
            });
            continue;
        }

        overflowed = true;
        // Keep the truncated prefix only when it is worth more than a marker.
        let note = estimate_units(&truncation_note(&segment.file_path));
        let prefix = truncate_at_line(segment.text, available.saturating_sub(note));
        if prefix.is_empty() || estimate_units(prefix) < marker {
            used += marker;
            chunks.push(omitted(segment));
        } else {
            used += estimate_units(prefix) + note;
            chunks.push(DiffChunk {
                file_path: segment.file_path,
                change_kind: segment.change_kind,
                content: ChunkContent::Truncated(prefix.to_string()),
            });
        }
    }

    BoundedDiff {
        over_budget: used > max_units,
        chunks,
    }
}

fn omitted(segment: Segment<'_>) -> DiffChunk {
    DiffChunk {
        file_path: segment.file_path,
        change_kind: segment.change_kind,
        content: ChunkContent::Omitted,
    }
}

/// Longest prefix of whole lines of `text` fitting in `max_units`.
fn truncate_at_line(text: &str, max_units: usize) -> &str {
    let mut end = 0;
    for line in text.split_inclusive('\n') {
        if estimate_units(&text[..end + line.len()]) > max_units {
            break;
        }
        end += line.len();
    }
    &text[..end]
}

/// Split a unified diff into per-file segments, keeping each file's headers.
fn split_segments(diff: &str) -> Vec<Segment<'_>> {
    let mut starts = Vec::new();
    let mut offset = 0;
    for line in diff.split_inclusive('\n') {
        if line.starts_with(DIFF_HEADER) {
            starts.push(offset);
        }
        offset += line.len();
    }

    if diff.trim().is_empty() {
        return Vec::new();
    }
    // Text before the first header still belongs in the output.
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(diff.len());
            let text = &diff[start..end];
            let (file_path, change_kind) = classify(text);
            Segment {
                text,
                file_path,
                change_kind,
            }
        })
        .collect()
}

/// Work out the file path and change kind from a segment's header lines.
fn classify(segment: &str) -> (String, ChangeKind) {
    let mut header_path = None;
    let mut new_path = None;
    let mut old_path = None;
    let mut rename_to = None;
    let mut kind = ChangeKind::Modified;
    let mut binary = false;

    for line in segment.lines() {
        if line.starts_with("@@") {
            break;
        }
        if let Some(rest) = line.strip_prefix(DIFF_HEADER) {
            header_path = parse_header_path(rest);
        } else if line.starts_with("new file mode") {
            kind = ChangeKind::Added;
        } else if line.starts_with("deleted file mode") {
            kind = ChangeKind::Deleted;
        } else if let Some(to) = line.strip_prefix("rename to ") {
            kind = ChangeKind::Renamed;
            rename_to = Some(unquote(to).to_string());
        } else if let Some(path) = line.strip_prefix("+++ ") {
            new_path = strip_side_prefix(path, "b/");
        } else if let Some(path) = line.strip_prefix("--- ") {
            old_path = strip_side_prefix(path, "a/");
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            binary = true;
        }
    }

    if binary {
        kind = ChangeKind::Binary;
    }

    let path = rename_to
        .or(new_path)
        .or(old_path)
        .or(header_path)
        .unwrap_or_else(|| "(unknown)".to_string());

    (path, kind)
}

/// Path from `a/<old> b/<new>`; the new side wins.
fn parse_header_path(rest: &str) -> Option<String> {
    let rest = rest.trim_end();
    let idx = rest.rfind(" b/").or_else(|| rest.rfind(" \"b/"))?;
    let new_side = unquote(rest[idx + 1..].trim());
    new_side.strip_prefix("b/").map(String::from)
}

fn strip_side_prefix(path: &str, prefix: &str) -> Option<String> {
    let path = unquote(path.trim_end());
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}
