//! Unified diff to two-sided text conversion
//!
//! External two-pane diff viewers know nothing about git patches, so a
//! (possibly multi-file) patch is expanded into a "before" and an "after"
//! body. Context lines go to both sides, removed lines only to the left and
//! added lines only to the right, with file and hunk banners written to both
//! sides so the viewer keeps them aligned.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{CommitDiff, DiffChange, DiffFileEntry, ParsedDiff};

/// Name git uses for the missing side of an added or deleted file
pub const NULL_DEVICE: &str = "/dev/null";

const OUTPUT_FOLDER: &str = "gitmind-diff";
const BEFORE_SUFFIX: &str = "before";
const AFTER_SUFFIX: &str = "after";
const SHORT_ID_LENGTH: usize = 7;
const HUNK_DIVIDER: &str = "- - - - - - - - - - - - - - - - - - - -";

/// Inclusive line range taken from a hunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub count: u32,
}

impl Default for LineRange {
    fn default() -> Self {
        Self { start: 1, count: 1 }
    }
}

impl LineRange {
    /// Last line of the range; an empty range collapses onto its start
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.count.max(1) - 1)
    }

    fn parse(text: &str) -> Option<Self> {
        match text.split_once(',') {
            Some((start, count)) => Some(Self {
                start: start.parse().ok()?,
                count: count.parse().ok()?,
            }),
            None => Some(Self {
                start: text.parse().ok()?,
                count: 1,
            }),
        }
    }
}

/// Parse the old and new ranges of a `@@ -a,b +c,d @@` header.
/// Anything unreadable falls back to a single line at line 1.
pub fn parse_hunk_header(line: &str) -> (LineRange, LineRange) {
    let body = line.trim_start_matches('@').trim_start();
    let mut tokens = body.split_whitespace();

    let old = tokens
        .next()
        .and_then(|t| t.strip_prefix('-'))
        .and_then(LineRange::parse)
        .unwrap_or_default();
    let new = tokens
        .next()
        .and_then(|t| t.strip_prefix('+'))
        .and_then(LineRange::parse)
        .unwrap_or_default();

    (old, new)
}

fn hunk_banner(old: LineRange, new: LineRange) -> String {
    if old == new {
        format!("Lines: {}-{}:", old.start, old.end())
    } else {
        format!(
            "Lines: {}-{} -> {}-{}:",
            old.start,
            old.end(),
            new.start,
            new.end()
        )
    }
}

fn file_banner(entry: &DiffFileEntry) -> String {
    match (entry.change, &entry.old_name) {
        (DiffChange::Renamed, Some(old_name)) => {
            format!("{}: {} -> {}", entry.change, old_name, entry.name)
        }
        _ => format!("{}: {}", entry.change, entry.name),
    }
}

/// Extract a file name from a `--- ` or `+++ ` header value
fn header_file_name(raw: &str) -> String {
    let name = raw.split('\t').next().unwrap_or(raw).trim();
    let name = name
        .strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .unwrap_or(name);

    if name == NULL_DEVICE {
        return name.to_string();
    }
    name.strip_prefix("a/")
        .or_else(|| name.strip_prefix("b/"))
        .unwrap_or(name)
        .to_string()
}

/// Drop a byte order mark that leaked into the text, either as the real
/// character or as its escaped/mis-decoded forms.
fn strip_bom(text: &str) -> &str {
    ["\u{feff}", "\u{ef}\u{bb}\u{bf}", "\\357\\273\\277", "\\ufeff"]
        .iter()
        .find_map(|bom| text.strip_prefix(bom))
        .unwrap_or(text)
}

#[derive(Default)]
struct Body {
    text: String,
    pending_newline: bool,
}

impl Body {
    fn push_line(&mut self, line: &str) {
        if self.pending_newline {
            self.text.push('\n');
            self.pending_newline = false;
        }
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn trim_trailing_newline(&mut self) {
        if self.text.ends_with('\n') {
            self.text.pop();
            self.pending_newline = true;
        }
    }
}

struct Sides {
    left: Body,
    right: Body,
}

impl Sides {
    fn both(&mut self, line: &str) {
        self.left.push_line(line);
        self.right.push_line(line);
    }
}

fn content_line(index: usize, text: &str, with_prefixes: bool) -> String {
    let text = strip_bom(text);
    if with_prefixes {
        format!("{}| {}", index, text)
    } else {
        text.to_string()
    }
}

/// Expand a unified diff into before/after bodies
pub fn parse_patch(patch: &str, with_prefixes: bool) -> ParsedDiff {
    let lines: Vec<&str> = patch.lines().collect();
    let mut sides = Sides {
        left: Body::default(),
        right: Body::default(),
    };
    let mut files: Vec<DiffFileEntry> = Vec::new();
    let mut i = 0;

    loop {
        // Next file section
        let Some(offset) = lines[i..].iter().position(|l| l.starts_with("--- ")) else {
            break;
        };
        let start = i + offset;

        let old_name = header_file_name(&lines[start][4..]);
        let new_name = lines
            .get(start + 1)
            .and_then(|l| l.strip_prefix("+++ "))
            .map(header_file_name)
            .unwrap_or_else(|| old_name.clone());

        let (change, name, renamed_from) = if old_name == NULL_DEVICE {
            (DiffChange::Added, new_name, None)
        } else if new_name == NULL_DEVICE {
            (DiffChange::Deleted, old_name, None)
        } else if old_name != new_name {
            (DiffChange::Renamed, new_name, Some(old_name))
        } else {
            (DiffChange::Modified, new_name, None)
        };

        let entry = DiffFileEntry {
            index: files.len() + 1,
            name,
            old_name: renamed_from,
            change,
        };

        if entry.index > 1 {
            sides.both("");
        }
        let banner = file_banner(&entry);
        sides.both(&banner);
        sides.both(&"=".repeat(banner.chars().count()));

        i = start;
        while i < lines.len() && (lines[i].starts_with("--- ") || lines[i].starts_with("+++ ")) {
            i += 1;
        }

        let mut first_hunk = true;
        let mut left_just_added = false;
        // Lines still expected by the current hunk header
        let (mut old_remaining, mut new_remaining) = (0u32, 0u32);
        while i < lines.len() {
            let line = lines[i];
            if line.starts_with("@@ ") {
                let (old, new) = parse_hunk_header(line);
                if !first_hunk {
                    sides.both(HUNK_DIVIDER);
                }
                sides.both(&hunk_banner(old, new));
                first_hunk = false;
                left_just_added = false;
                old_remaining = old.count;
                new_remaining = new.count;
            } else if line.starts_with("\\ ") {
                if left_just_added {
                    sides.left.trim_trailing_newline();
                }
                left_just_added = false;
            } else if old_remaining == 0 && new_remaining == 0 {
                // Hunk exhausted; a `--- ` here starts the next file
                break;
            } else if let Some(text) = line.strip_prefix(' ') {
                sides.both(&content_line(entry.index, text, with_prefixes));
                old_remaining = old_remaining.saturating_sub(1);
                new_remaining = new_remaining.saturating_sub(1);
                left_just_added = true;
            } else if let Some(text) = line.strip_prefix('-') {
                sides
                    .left
                    .push_line(&content_line(entry.index, text, with_prefixes));
                old_remaining = old_remaining.saturating_sub(1);
                left_just_added = true;
            } else if let Some(text) = line.strip_prefix('+') {
                sides
                    .right
                    .push_line(&content_line(entry.index, text, with_prefixes));
                new_remaining = new_remaining.saturating_sub(1);
                left_just_added = false;
            } else {
                break;
            }
            i += 1;
        }

        files.push(entry);
    }

    let (mut left, mut right) = (sides.left.text, sides.right.text);
    if with_prefixes && !files.is_empty() {
        let manifest = manifest(&files);
        left.insert_str(0, &manifest);
        right.insert_str(0, &manifest);
    }

    ParsedDiff { left, right, files }
}

fn manifest(files: &[DiffFileEntry]) -> String {
    let mut text = String::from("Files:\n");
    for file in files {
        text.push_str(&format!("{}| {}\n", file.index, file.name));
    }
    text.push('\n');
    text
}

/// Writes parsed diffs to files for an external viewer
#[derive(Debug, Clone)]
pub struct DiffParser {
    output_dir: PathBuf,
}

impl Default for DiffParser {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(OUTPUT_FOLDER))
    }
}

impl DiffParser {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths of the before/after files for a commit (or for an id-less diff)
    pub fn output_paths(&self, commit_id: Option<&str>) -> (PathBuf, PathBuf) {
        let name = |suffix: &str| match commit_id.map(short_id).filter(|id| !id.is_empty()) {
            Some(id) => format!("{}_{}.txt", id, suffix),
            None => format!("{}.txt", suffix),
        };
        (
            self.output_dir.join(name(BEFORE_SUFFIX)),
            self.output_dir.join(name(AFTER_SUFFIX)),
        )
    }

    /// Parse `patch` and (over)write the before/after files
    pub async fn parse(
        &self,
        commit_id: Option<&str>,
        patch: &str,
        with_prefixes: bool,
    ) -> Result<CommitDiff> {
        let parsed = parse_patch(patch, with_prefixes);
        let (left_path, right_path) = self.output_paths(commit_id);

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&left_path, parsed.left.as_bytes()).await?;
        tokio::fs::write(&right_path, parsed.right.as_bytes()).await?;

        tracing::debug!(
            "Wrote diff of {} files to {}",
            parsed.files.len(),
            left_path.display()
        );

        Ok(CommitDiff {
            left_path,
            right_path,
            changed_files: parsed.files.into_iter().map(|f| f.name).collect(),
        })
    }
}

/// Short, file-name-safe form of a commit id
fn short_id(commit_id: &str) -> String {
    commit_id
        .chars()
        .take(SHORT_ID_LENGTH)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
