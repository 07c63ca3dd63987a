//! Placeholder-based path template parser.
//!
//! Templates name constraint columns in braces:
//! ```text
//! {root}/{package}/{package}-{version}.pkg
//! ```
//! Scalar constraint values are substituted literally; glob patterns and
//! version ranges become `*` so enumeration lists every candidate, and the
//! candidates are then checked against the original constraint.

use crate::candidate::CandidateArtifact;
use crate::params::{ParameterSet, ValueKind};
use crate::parser::{
    DependencyInput, DependencyParser, Parser, ParserError, PathGroup, Source, Survivor,
};
use regex::Regex;
use semver::{Version, VersionReq};
use std::path::{Path, PathBuf};

/// Placeholder replaced by the source root.
pub const ROOT_PLACEHOLDER: &str = "root";

/// Default column compared when breaking ties.
pub const DEFAULT_VERSION_COLUMN: &str = "version";

const GLOB_META: &[char] = &['*', '?', '['];

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Column(String),
}

fn segments(template: &str) -> Result<Vec<Segment>, ParserError> {
    let invalid = |reason: &str| ParserError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut out = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            out.push(Segment::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
        let column = &after[..close];
        if column.is_empty() || column.contains('{') {
            return Err(invalid("empty or nested placeholder"));
        }
        out.push(Segment::Column(column.to_string()));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Literal(rest.to_string()));
    }
    Ok(out)
}

/// Translate literal template text, keeping `**`, `*` and `?` as wildcards.
fn glob_to_regex(text: &str) -> String {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

/// Whether `actual` satisfies the constraint value `expected`.
#[must_use]
pub fn value_matches(expected: &str, actual: &str) -> bool {
    match ValueKind::of(expected) {
        ValueKind::Scalar => expected == actual,
        ValueKind::Glob => glob::Pattern::new(expected).is_ok_and(|p| p.matches(actual)),
        ValueKind::Range => match (VersionReq::parse(expected), parse_version(actual)) {
            (Ok(req), Some(version)) => req.matches(&version),
            _ => false,
        },
    }
}

/// Parse a version, padding short forms such as `2.0` to `2.0.0`.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }

    let (core, suffix) = match raw.find(['-', '+']) {
        Some(at) => raw.split_at(at),
        None => (raw, ""),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() >= 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&format!("{padded}{suffix}")).ok()
}

/// Parser for `{column}` path templates and whitespace-column dependency
/// files.
#[derive(Debug, Clone)]
pub struct TemplateParser {
    templates: Vec<String>,
    columns: Vec<String>,
    version_column: String,
}

impl TemplateParser {
    /// Create a parser whose dependency files list `columns` in order.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            templates: Vec::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            version_column: DEFAULT_VERSION_COLUMN.to_string(),
        }
    }

    /// Add a path template, validating its placeholder syntax.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self, ParserError> {
        let template = template.into();
        segments(&template)?;
        self.templates.push(template);
        Ok(self)
    }

    /// Compare a different column when breaking ties.
    #[must_use]
    pub fn with_version_column(mut self, column: impl Into<String>) -> Self {
        self.version_column = column.into();
        self
    }

    /// Substitute `params` into a template for enumeration.
    fn expand(&self, template: &str, root: &Path, params: &ParameterSet) -> Result<String, ParserError> {
        let mut out = String::new();
        for segment in segments(template)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Column(column) if column == ROOT_PLACEHOLDER => {
                    out.push_str(root.to_string_lossy().trim_end_matches('/'));
                }
                Segment::Column(column) => match params.get(&column) {
                    Some(value) if !ValueKind::of(value).is_pattern() => out.push_str(value),
                    _ => out.push('*'),
                },
            }
        }
        Ok(out)
    }

    /// Regex matching concrete paths produced by `template`.
    ///
    /// The first occurrence of each column is captured by name.
    fn pattern(template: &str, params: &ParameterSet) -> Result<Regex, ParserError> {
        let mut re = String::from("^");
        let mut seen = Vec::new();
        for segment in segments(template)? {
            match segment {
                Segment::Literal(text) => re.push_str(&glob_to_regex(&text)),
                Segment::Column(column) if column == ROOT_PLACEHOLDER => re.push_str(".*"),
                Segment::Column(column) => {
                    let body = match params.get(&column) {
                        Some(value) if !ValueKind::of(value).is_pattern() => regex::escape(value),
                        _ => "[^/]*".to_string(),
                    };
                    if seen.contains(&column) {
                        re.push_str(&format!("(?:{body})"));
                    } else {
                        re.push_str(&format!("(?P<{column}>{body})"));
                        seen.push(column);
                    }
                }
            }
        }
        re.push('$');
        Ok(Regex::new(&re)?)
    }

    /// Column values captured from the first template matching `path`.
    fn captures(&self, path: &str, params: &ParameterSet) -> Option<ParameterSet> {
        self.templates.iter().find_map(|template| {
            let re = Self::pattern(template, params).ok()?;
            let caps = re.captures(path)?;
            Some(
                re.capture_names()
                    .flatten()
                    .filter_map(|name| caps.name(name).map(|m| (name, m.as_str())))
                    .collect(),
            )
        })
    }

    fn version_of(&self, survivor: &Survivor) -> Option<Version> {
        let column = self.version_column.as_str();
        survivor
            .candidate
            .derived
            .get(column)
            .filter(|v| !ValueKind::of(v).is_pattern())
            .or_else(|| survivor.params.get(column))
            .and_then(parse_version)
    }
}

impl Parser for TemplateParser {
    fn get_paths(
        &self,
        input: &DependencyInput,
        source: &Source,
    ) -> Result<Vec<PathGroup>, ParserError> {
        let rows = match input {
            DependencyInput::Rows(rows) => rows.clone(),
            DependencyInput::File(path) => self.find_dependencies(path)?,
        };

        rows.into_iter()
            .map(|params| {
                let paths = self
                    .templates
                    .iter()
                    .map(|t| self.expand(t, &source.root, &params))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PathGroup { params, paths })
            })
            .collect()
    }

    fn split_fixed_pattern(&self, path: &str) -> (PathBuf, String) {
        let parts: Vec<&str> = path.split('/').collect();
        let first_glob = parts
            .iter()
            .position(|part| part.contains(GLOB_META))
            .unwrap_or(parts.len().saturating_sub(1));

        let fixed = parts[..first_glob].join("/");
        let fixed = if fixed.is_empty() && path.starts_with('/') {
            "/".to_string()
        } else {
            fixed
        };
        (PathBuf::from(fixed), parts[first_glob..].join("/"))
    }

    fn validate_path(&self, path: &str, params: &ParameterSet) -> bool {
        self.captures(path, params).is_some_and(|captured| {
            captured.iter().all(|(column, actual)| {
                params
                    .get(column)
                    .map_or(true, |expected| value_matches(expected, actual))
            })
        })
    }

    fn validate(
        &self,
        properties: &ParameterSet,
        kind: &str,
        params: &ParameterSet,
    ) -> (bool, ParameterSet) {
        let mut refined = params.clone();
        if kind != crate::candidate::PROPERTIES_KIND {
            return (true, refined);
        }
        for (column, expected) in params.iter() {
            if let Some(actual) = properties.get(column) {
                if !value_matches(expected, actual) {
                    return (false, ParameterSet::new());
                }
                refined.insert(column, actual);
            }
        }
        (true, refined)
    }

    fn filter_one(
        &self,
        candidates: Vec<CandidateArtifact>,
        params: &ParameterSet,
    ) -> Vec<Survivor> {
        let survivors: Vec<Survivor> = candidates
            .into_iter()
            .map(|candidate| {
                let location = candidate.location.path().to_string_lossy().into_owned();
                let params = self.captures(&location, params).unwrap_or_default();
                Survivor { candidate, params }
            })
            .collect();

        let pinned = params
            .get(&self.version_column)
            .is_some_and(|v| !ValueKind::of(v).is_pattern());
        if survivors.len() <= 1 || pinned {
            return survivors;
        }

        let Some(best) = survivors.iter().filter_map(|s| self.version_of(s)).max() else {
            return survivors;
        };
        survivors
            .into_iter()
            .filter(|s| self.version_of(s).as_ref() == Some(&best))
            .collect()
    }
}

impl DependencyParser for TemplateParser {
    fn find_dependencies(&self, deps_file: &Path) -> Result<Vec<ParameterSet>, ParserError> {
        let content = std::fs::read_to_string(deps_file).map_err(|source| ParserError::Io {
            path: deps_file.to_path_buf(),
            source,
        })?;

        let mut rows = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let values: Vec<&str> = line.split_whitespace().collect();
            if values.len() > self.columns.len() {
                return Err(ParserError::TooManyColumns {
                    path: deps_file.to_path_buf(),
                    line: index + 1,
                    found: values.len(),
                    expected: self.columns.len(),
                });
            }
            rows.push(
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(values)
                    .collect(),
            );
        }
        Ok(rows)
    }
}
