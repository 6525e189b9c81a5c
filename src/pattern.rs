//! Path patterns.
//!
//! A pattern is a `/`-separated list of segments:
//!
//! ```ignore
//!  Syntax    Type
//!  literal   matches itself
//!  :name     named parameter, matches one non-empty segment
//!  *name     catch-all, matches the rest of the path (possibly nothing)
//! ```
//!
//! A catch-all must be the last segment. Its preceding slash is optional, so
//! `/files/*rest` matches `/files`, `/files/` and `/files/a/b`. Names that
//! start with `__` are reserved for internal captures and are not reported
//! in [`PatternMatch::params`].

use regex::Regex;

use crate::core::Params;
use crate::error::PatternError;

/// Name of the catch-all used by groups to match their descendants.
pub(crate) const NESTED: &str = "__nested";

/// Result of matching a path against a [`Pattern`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMatch {
    /// Named parameters and public catch-alls.
    pub params: Params,
    /// What the catch-all matched, if the pattern has one and it matched
    /// anything beyond the prefix.
    pub remainder: Option<String>,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
    catch_all: Option<String>,
}

impl Pattern {
    pub fn compile(source: &str) -> Result<Self, PatternError> {
        let segments: Vec<&str> = source.split('/').filter(|s| !s.is_empty()).collect();

        let mut regex = String::from("^");
        let mut names = Vec::new();
        let mut catch_all = None;

        for (i, segment) in segments.iter().enumerate() {
            if let Some(name) = segment.strip_prefix(':') {
                check_name(source, name, &names)?;
                regex.push_str(&format!("/(?P<{name}>[^/]+)"));
                names.push(name.to_string());
            } else if let Some(name) = segment.strip_prefix('*') {
                if i + 1 != segments.len() {
                    return Err(PatternError::CatchAllNotLast(source.into()));
                }
                check_name(source, name, &names)?;
                regex.push_str(&format!("(?:/(?P<{name}>.*))?"));
                names.push(name.to_string());
                catch_all = Some(name.to_string());
            } else {
                regex.push('/');
                regex.push_str(&regex::escape(segment));
            }
        }

        if segments.is_empty() {
            regex.push('/');
        }
        regex.push('$');

        let regex =
            Regex::new(&regex).map_err(|e| PatternError::Regex(source.into(), e.to_string()))?;

        Ok(Self {
            source: source.into(),
            regex,
            names,
            catch_all,
        })
    }

    /// Compiles `prefix` followed by the internal catch-all, the pattern a
    /// group uses to match itself and everything below it.
    pub fn nested(prefix: &str) -> Result<Self, PatternError> {
        Self::compile(&crate::path::join(&[prefix, &format!("*{NESTED}")]))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn test(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn exec(&self, path: &str) -> Option<PatternMatch> {
        let captures = self.regex.captures(path)?;
        let mut result = PatternMatch::default();

        for name in &self.names {
            let Some(value) = captures.name(name) else {
                continue;
            };

            if self.catch_all.as_deref() == Some(name.as_str()) && !value.as_str().is_empty() {
                result.remainder = Some(value.as_str().to_string());
            }

            if !name.starts_with("__") {
                result.params.insert(name.clone(), value.as_str().to_string());
            }
        }

        Some(result)
    }
}

fn check_name(source: &str, name: &str, seen: &[String]) -> Result<(), PatternError> {
    let mut chars = name.chars();

    match chars.next() {
        None => return Err(PatternError::EmptyName(source.into())),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(PatternError::InvalidName(source.into(), name.into()));
        }
        _ => {}
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PatternError::InvalidName(source.into(), name.into()));
    }

    if seen.iter().any(|n| n == name) {
        return Err(PatternError::DuplicateName(source.into(), name.into()));
    }

    Ok(())
}
