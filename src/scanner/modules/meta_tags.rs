//! Interesting meta tag detection
//!
//! Flags `<meta ...>` tags whose text mentions keywords that tend to leak
//! authorship, platform or version details.

use regex::Regex;

use crate::error::ModuleError;
use crate::scanner::alerts::{Alert, Severity};
use crate::scanner::module::{ModuleContext, ModuleDescriptor, ScanModule};

pub const MODULE_NAME: &str = "vinfo-metatags";

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "user",
    "password",
    "source",
    "author",
    "microsoft",
    "visual",
    "linux",
    "release",
    "version",
];

/// Result of looking for one keyword in a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordMatch {
    NoMatch,
    Match { snippet: String },
}

/// Per-keyword results of one scan, in keyword order
#[derive(Debug, Clone, Default)]
pub struct MetaTagScan {
    results: Vec<(String, KeywordMatch)>,
}

impl MetaTagScan {
    pub fn results(&self) -> &[(String, KeywordMatch)] {
        &self.results
    }

    pub fn has_matches(&self) -> bool {
        self.matched().next().is_some()
    }

    /// Keywords that matched, with their snippet
    pub fn matched(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|(keyword, result)| match result {
            KeywordMatch::Match { snippet } => Some((keyword.as_str(), snippet.as_str())),
            KeywordMatch::NoMatch => None,
        })
    }

    /// Matched snippets, each terminated by a newline
    pub fn output(&self) -> String {
        self.matched().fold(String::new(), |mut output, (_, snippet)| {
            output.push_str(snippet);
            output.push('\n');
            output
        })
    }
}

struct KeywordPattern {
    keyword: String,
    regex: Regex,
}

impl KeywordPattern {
    /// `<meta`, anything but `>`, the keyword, anything up to the closing `>`
    fn compile(keyword: &str) -> Result<Self, ModuleError> {
        let pattern = format!(r"(?i)<meta[^>]*(?:{})[^>]*>", keyword);
        let regex = Regex::new(&pattern).map_err(|e| ModuleError::Pattern {
            keyword: keyword.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            keyword: keyword.to_string(),
            regex,
        })
    }
}

/// Response processor reporting meta tags that mention configured keywords
///
/// Keywords are case-insensitive regex fragments. Only the first tag per
/// keyword is reported, and every matching keyword contributes one line to a
/// single alert per transaction.
pub struct MetaTagModule {
    descriptor: ModuleDescriptor,
    patterns: Vec<KeywordPattern>,
}

impl MetaTagModule {
    pub fn new() -> Self {
        Self::with_keywords(DEFAULT_KEYWORDS)
    }

    /// Build the module from an ordered keyword list
    ///
    /// Keywords that do not compile are logged and left out.
    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();

        for keyword in keywords {
            match KeywordPattern::compile(keyword.as_ref()) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => tracing::warn!(module = MODULE_NAME, error = %e, "Skipping keyword"),
            }
        }

        Self {
            descriptor: ModuleDescriptor::response_processor(
                MODULE_NAME,
                "Interesting Meta Tag Detection",
            ),
            patterns,
        }
    }

    /// Keywords in the order they are tested
    pub fn keywords(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.keyword.as_str()).collect()
    }

    /// Scan a body, keeping the first matching tag per keyword
    pub fn scan(&self, body: &str) -> MetaTagScan {
        let results = self
            .patterns
            .iter()
            .map(|pattern| {
                let result = match pattern.regex.find(body) {
                    Some(m) => KeywordMatch::Match {
                        snippet: m.as_str().to_string(),
                    },
                    None => KeywordMatch::NoMatch,
                };
                (pattern.keyword.clone(), result)
            })
            .collect();

        MetaTagScan { results }
    }
}

impl Default for MetaTagModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanModule for MetaTagModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &ModuleContext<'_>) -> Result<(), ModuleError> {
        let transaction = ctx.transaction();
        let response = transaction.response();
        if !response.has_body() {
            return Ok(());
        }

        let scan = self.scan(&response.body_text());
        if !scan.has_matches() {
            return Ok(());
        }

        tracing::debug!(
            module = MODULE_NAME,
            resource = transaction.uri(),
            keywords = ?scan.matched().map(|(k, _)| k).collect::<Vec<_>>(),
            "Interesting meta tags found"
        );

        ctx.publish_alert(
            Alert::builder(MODULE_NAME, transaction)
                .severity(Severity::Informational)
                .field("output", scan.output())
                .build(),
        );

        Ok(())
    }
}
