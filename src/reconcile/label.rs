//! Line-level rewriting of YOLO label files.
//!
//! A label line is `<class_id> <geometry...>`, whitespace separated. Only the
//! leading token is ever changed; geometry tokens are copied as-is.

use std::ops::{Add, AddAssign};
use std::path::Path;

use serde::Serialize;

use crate::error::PrepError;
use crate::schema::{ClassId, RemapOutcome, RemapTable, UnmappedPolicy};

/// Per-line counters, summed across files and datasets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LabelLineStats {
    /// Lines whose class ID was rewritten to a different canonical ID.
    pub remapped: usize,
    /// Lines whose class ID already equalled its canonical ID.
    pub unchanged: usize,
    /// Damage-class lines dropped.
    pub removed: usize,
    /// Lines with an unmapped class kept verbatim.
    pub kept_unmapped: usize,
    /// Lines with an unmapped class dropped by policy.
    pub dropped_unmapped: usize,
    /// Lines dropped because they could not be parsed.
    pub malformed: usize,
}

impl LabelLineStats {
    /// Lines present in the rewritten output.
    pub fn surviving(&self) -> usize {
        self.remapped + self.unchanged + self.kept_unmapped
    }
}

impl Add for LabelLineStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            remapped: self.remapped + rhs.remapped,
            unchanged: self.unchanged + rhs.unchanged,
            removed: self.removed + rhs.removed,
            kept_unmapped: self.kept_unmapped + rhs.kept_unmapped,
            dropped_unmapped: self.dropped_unmapped + rhs.dropped_unmapped,
            malformed: self.malformed + rhs.malformed,
        }
    }
}

impl AddAssign for LabelLineStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for LabelLineStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// A parsed label line.
#[derive(Debug, PartialEq)]
pub enum LabelLine<'a> {
    Blank,
    /// Fewer than two tokens or a non-integer class token.
    Malformed,
    Annotation {
        /// The class token as written. Values outside the `u32` range are
        /// kept so they can be treated as undeclared classes.
        class_id: i64,
        /// The trimmed line.
        raw: &'a str,
        /// Every token after the class ID.
        geometry: Vec<&'a str>,
    },
}

/// Classify one line of a label file.
pub fn parse_label_line(line: &str) -> LabelLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LabelLine::Blank;
    }

    let mut tokens = trimmed.split_whitespace();
    let Some(first) = tokens.next() else {
        return LabelLine::Blank;
    };
    let geometry: Vec<&str> = tokens.collect();
    if geometry.is_empty() {
        return LabelLine::Malformed;
    }

    match first.parse::<i64>() {
        Ok(class_id) => LabelLine::Annotation {
            class_id,
            raw: trimmed,
            geometry,
        },
        Err(_) => LabelLine::Malformed,
    }
}

/// Result of rewriting one label file's text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelRewrite {
    /// Surviving lines, without terminators.
    pub lines: Vec<String>,
    pub stats: LabelLineStats,
}

/// Rewrite the lines of a label file through a remap table.
///
/// `path` is only used for error context. Fails only under
/// [`UnmappedPolicy::Fail`] when a line references an unmapped or
/// undeclared class.
pub fn rewrite_label_text(
    text: &str,
    table: &RemapTable<ClassId>,
    policy: UnmappedPolicy,
    path: &Path,
) -> Result<LabelRewrite, PrepError> {
    let mut out = LabelRewrite::default();

    for (line_idx, line) in text.lines().enumerate() {
        let (class_id, raw, geometry) = match parse_label_line(line) {
            LabelLine::Blank => continue,
            LabelLine::Malformed => {
                out.stats.malformed += 1;
                continue;
            }
            LabelLine::Annotation {
                class_id,
                raw,
                geometry,
            } => (class_id, raw, geometry),
        };

        let outcome = u32::try_from(class_id)
            .ok()
            .and_then(|id| table.outcome(ClassId::new(id)));
        match outcome {
            Some(RemapOutcome::Removed) => out.stats.removed += 1,
            Some(RemapOutcome::Mapped(canonical)) => {
                if i64::from(canonical.as_u32()) == class_id {
                    out.stats.unchanged += 1;
                } else {
                    out.stats.remapped += 1;
                }
                out.lines.push(join_line(canonical, &geometry));
            }
            Some(RemapOutcome::Unmapped) | None => match policy {
                UnmappedPolicy::Keep => {
                    out.stats.kept_unmapped += 1;
                    out.lines.push(raw.to_string());
                }
                UnmappedPolicy::Drop => out.stats.dropped_unmapped += 1,
                UnmappedPolicy::Fail => {
                    return Err(PrepError::UnmappedLabelRejected {
                        path: path.to_path_buf(),
                        line: line_idx + 1,
                        class_id,
                    });
                }
            },
        }
    }

    Ok(out)
}

fn join_line(class_id: ClassId, geometry: &[&str]) -> String {
    let mut line = class_id.to_string();
    for token in geometry {
        line.push(' ');
        line.push_str(token);
    }
    line
}

/// Fuzz-only entrypoint for label-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) {
    let _ = parse_label_line(input);
}
