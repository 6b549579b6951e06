use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::models::finding::{Confidence, Finding, Location, Severity, Source};

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*+]\s+|\d+[.)]\s+)?(?:\*\*|__)?\s*(location|file|where|path|line|position|severity|priority|category|type|kind|description|issue|summary|details|problem|message|confidence)\s*(?:\*\*|__)?\s*[:=]\s*(?:\*\*|__)?\s*(.*)$",
    )
    .unwrap()
});
static LINE_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bline\s*(\d+)").unwrap());
static UNIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w./\\-]+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Field {
    Location,
    Line,
    Severity,
    Category,
    Description,
    Confidence,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "location" | "file" | "where" | "path" => Some(Self::Location),
            "line" | "position" => Some(Self::Line),
            "severity" | "priority" => Some(Self::Severity),
            "category" | "type" | "kind" => Some(Self::Category),
            "description" | "issue" | "summary" | "details" | "problem" | "message" => Some(Self::Description),
            "confidence" => Some(Self::Confidence),
            _ => None,
        }
    }
}

type RawBlock = BTreeMap<Field, String>;

/// Turn one source's raw output into findings. Never fails: anything that
/// cannot be read is dropped or defaulted.
pub fn normalize(raw: &str, source: &Source) -> Vec<Finding> {
    let blocks = match structured_blocks(raw) {
        Some(blocks) => blocks,
        None => labeled_blocks(raw),
    };

    let total = blocks.len();
    let findings: Vec<Finding> = blocks.into_iter().filter_map(|b| resolve(b, source)).collect();
    if findings.len() < total {
        debug!(source = %source.id, dropped = total - findings.len(), "Dropped blocks without a description");
    }
    findings
}

/// JSON array of finding-like objects, optionally inside a fenced block.
fn structured_blocks(raw: &str) -> Option<Vec<RawBlock>> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if start >= end {
        return None;
    }
    let items: Vec<Value> = serde_json::from_str(&raw[start..=end]).ok()?;
    let blocks: Vec<RawBlock> = items.iter().filter_map(Value::as_object).map(object_block).collect();
    if blocks.is_empty() { None } else { Some(blocks) }
}

fn object_block(obj: &serde_json::Map<String, Value>) -> RawBlock {
    let mut block = RawBlock::new();
    for (key, value) in obj {
        let Some(field) = Field::from_label(key) else { continue };
        match (field, value) {
            // {"location": {"file": "a.rs", "line": 3}}
            (Field::Location, Value::Object(inner)) => {
                for (k, v) in inner {
                    if let (Some(f @ (Field::Location | Field::Line)), Some(s)) = (Field::from_label(k), scalar(v)) {
                        block.entry(f).or_insert(s);
                    }
                }
            }
            _ => {
                if let Some(s) = scalar(value) {
                    block.entry(field).or_insert(s);
                }
            }
        }
    }
    block
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tolerant scan for `Label: value` lines in document order.
fn labeled_blocks(raw: &str) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    let mut current = RawBlock::new();
    let mut last: Option<Field> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if is_separator(trimmed) {
            flush(&mut blocks, &mut current);
            last = None;
            continue;
        }

        if let Some(caps) = LABEL_RE.captures(line) {
            let Some(field) = Field::from_label(&caps[1]) else { continue };
            if current.contains_key(&field) {
                flush(&mut blocks, &mut current);
            }
            current.insert(field, clean_value(&caps[2]));
            last = Some(field);
        } else if last == Some(Field::Description) && !trimmed.is_empty() {
            if let Some(desc) = current.get_mut(&Field::Description) {
                if !desc.is_empty() {
                    desc.push(' ');
                }
                desc.push_str(trimmed);
            }
        } else if trimmed.is_empty() {
            last = None;
        }
    }
    flush(&mut blocks, &mut current);
    blocks
}

fn is_separator(line: &str) -> bool {
    line.starts_with('#')
        || (line.len() >= 3 && line.chars().all(|c| c == '-' || c == '*' || c == '_' || c == '='))
}

fn flush(blocks: &mut Vec<RawBlock>, current: &mut RawBlock) {
    if !current.is_empty() {
        blocks.push(std::mem::take(current));
    }
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_end_matches("**")
        .trim_end_matches("__")
        .trim()
        .to_string()
}

fn resolve(mut block: RawBlock, source: &Source) -> Option<Finding> {
    let description = block.remove(&Field::Description)?.trim().to_string();
    if description.is_empty() {
        return None;
    }

    let location = parse_location(block.get(&Field::Location).map(String::as_str), block.get(&Field::Line).map(String::as_str));

    let mut confidence = block
        .get(&Field::Confidence)
        .and_then(|c| Confidence::parse(c))
        .unwrap_or(Confidence::Likely);
    let severity = match block.get(&Field::Severity).and_then(|s| Severity::parse(s)) {
        Some(severity) => severity,
        None => {
            confidence = confidence.min(Confidence::Potential);
            Severity::Low
        }
    };

    let category = block
        .remove(&Field::Category)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| source.focus.clone());

    Some(Finding {
        location,
        severity,
        category,
        description,
        confidence,
        contributing_sources: BTreeSet::from([source.id.clone()]),
        dimensions: BTreeSet::from([source.focus.clone()]),
    })
}

/// Accepts `path:line`, `path:line:col`, `path:10-20`, `path, line 10` and a
/// separate line field. A bare path means a file-level finding at line 0.
pub fn parse_location(location: Option<&str>, line: Option<&str>) -> Option<Location> {
    let cleaned = location?.trim().trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '*').trim();
    if cleaned.is_empty() || ["n/a", "none", "unknown", "-"].contains(&cleaned.to_lowercase().as_str()) {
        return None;
    }

    let unit_end = cleaned
        .find(|c: char| c == ':' || c == ',' || c == '(' || c.is_whitespace())
        .unwrap_or(cleaned.len());
    let unit = cleaned[..unit_end].trim_matches('`');
    if !UNIT_RE.is_match(unit) || !(unit.contains('.') || unit.contains('/')) {
        return None;
    }

    let rest = &cleaned[unit_end..];
    let position = rest
        .strip_prefix(':')
        .and_then(leading_number)
        .or_else(|| LINE_WORD_RE.captures(rest).and_then(|c| c[1].parse().ok()))
        .or_else(|| line.and_then(leading_number))
        .unwrap_or(0);

    Some(Location::new(unit, position))
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
