//! Heuristic splitting of synopsis and outline text into chapter and scene records.
//!
//! Segmentation runs in two stages: every line is classified as a boundary or a
//! body line, then consecutive lines are grouped under the boundary that opened
//! them. Text before the first boundary is discarded.

use crate::models::{ChapterRecord, SceneRecord};
use crate::utils::{join_trimmed_lines, strip_markup};
use regex::Regex;
use std::sync::LazyLock;

static CHAPTER_RULE: LazyLock<BoundaryRule> = LazyLock::new(|| {
    BoundaryRule::from_patterns(&[
        // פרק 1: Title, פרק 1 - Title, פרק1
        r"(?i)^[*#\s]*(?:פרק|chapter)\s*\d+",
        // פרק ראשון: Title, Chapter One: Title
        r"(?i)^[*#\s]*(?:פרק|chapter)\s+[^:\n]{1,30}:",
    ])
});

static SCENE_RULE: LazyLock<BoundaryRule> = LazyLock::new(|| {
    BoundaryRule::from_patterns(&[
        // **סצנה 1: Title**, ## סצנה 2
        r"(?i)^(?:\*\*|#+)\s*(?:סצנה|scene)",
        // 1. **Title**
        r"^\d+\.\s*\*",
    ])
});

/// A set of heading patterns; a line is a boundary if any of them matches.
#[derive(Debug)]
pub struct BoundaryRule {
    regexes: Vec<Regex>,
}

impl BoundaryRule {
    fn from_patterns(patterns: &[&str]) -> Self {
        let regexes = patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::error!("Skipping invalid boundary pattern {pattern:?}: {e}");
                    None
                }
            })
            .collect();
        Self { regexes }
    }

    pub fn chapters() -> &'static BoundaryRule {
        &CHAPTER_RULE
    }

    pub fn scenes() -> &'static BoundaryRule {
        &SCENE_RULE
    }

    pub fn is_boundary(&self, line: &str) -> bool {
        let line = line.trim();
        !line.is_empty() && self.regexes.iter().any(|regex| regex.is_match(line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass<'a> {
    Boundary(&'a str),
    Body(&'a str),
}

/// One heading together with the lines that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The boundary line exactly as it appeared in the source.
    pub heading: String,
    /// The boundary line with markup stripped.
    pub title: String,
    pub body: String,
}

pub fn classify_lines<'a>(text: &'a str, rule: &BoundaryRule) -> Vec<LineClass<'a>> {
    text.lines()
        .map(|line| {
            if rule.is_boundary(line) {
                LineClass::Boundary(line)
            } else {
                LineClass::Body(line)
            }
        })
        .collect()
}

pub fn group_segments(lines: &[LineClass<'_>]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Option<(&str, Vec<&str>)> = None;

    for class in lines {
        match *class {
            LineClass::Boundary(heading) => {
                if let Some((prev, body)) = current.take() {
                    segments.push(finish_segment(prev, &body));
                }
                current = Some((heading, Vec::new()));
            }
            LineClass::Body(line) => {
                // Lines before the first boundary have no owner and are dropped.
                if let Some((_, body)) = current.as_mut() {
                    body.push(line);
                }
            }
        }
    }

    if let Some((heading, body)) = current {
        segments.push(finish_segment(heading, &body));
    }

    segments
}

fn finish_segment(heading: &str, body: &[&str]) -> Segment {
    Segment {
        heading: heading.to_string(),
        title: strip_markup(heading),
        body: join_trimmed_lines(body),
    }
}

pub fn segment_chapters(text: &str) -> Vec<ChapterRecord> {
    let segments = group_segments(&classify_lines(text, BoundaryRule::chapters()));
    tracing::debug!("Segmented {} chapters", segments.len());

    segments
        .into_iter()
        .map(|segment| {
            tracing::trace!(heading = %segment.heading, "Chapter boundary");
            ChapterRecord {
                title: segment.title,
                content: segment.body,
            }
        })
        .collect()
}

pub fn segment_scenes(text: &str) -> Vec<SceneRecord> {
    let segments = group_segments(&classify_lines(text, BoundaryRule::scenes()));
    tracing::debug!("Segmented {} scenes", segments.len());

    segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| SceneRecord {
            title: segment.title,
            content: segment.body,
            card_id: format!("scene-card-content-{index}"),
        })
        .collect()
}
