//! Alias table of interchangeable answer phrasings.
//!
//! Each line of an alias file lists a canonical phrase and its alternates,
//! either quoted (`"New York City" "NYC"`) or delimited
//! (`New York City | NYC`). Lines starting with `#` are comments.

use crate::error::{EvalError, Result};
use crate::matcher::normalize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

/// A set of equivalent phrases, all stored normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasGroup {
    pub canonical: String,
    pub alternates: BTreeSet<String>,
}

impl AliasGroup {
    /// Canonical phrase followed by the alternates.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical.as_str()).chain(self.alternates.iter().map(String::as_str))
    }

    fn absorb(&mut self, other: AliasGroup) {
        self.alternates.insert(other.canonical);
        self.alternates.extend(other.alternates);
        self.alternates.remove(&self.canonical);
    }
}

/// Lookup from any normalized phrase to its equivalence group.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    groups: Vec<Option<AliasGroup>>,
    lookup: HashMap<String, usize>,
}

impl AliasTable {
    /// Load an alias file.
    pub fn load(path: &Path, delimiter: char) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let table = Self::from_text(&text, delimiter, path)?;
        debug!(path = %path.display(), groups = table.len(), "loaded alias table");
        Ok(table)
    }

    /// Parse alias lines; `origin` is only used in diagnostics.
    pub fn from_text(text: &str, delimiter: char, origin: &Path) -> Result<Self> {
        let mut table = Self::default();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let phrases = split_phrases(line, delimiter)
                .map_err(|reason| EvalError::alias(origin, line_no, reason))?;

            let mut normalized = Vec::with_capacity(phrases.len());
            for phrase in phrases {
                let n = normalize(phrase);
                if n.is_empty() {
                    return Err(EvalError::alias(
                        origin,
                        line_no,
                        format!("phrase '{}' is empty after normalization", phrase),
                    ));
                }
                if !normalized.contains(&n) {
                    normalized.push(n);
                }
            }

            if normalized.len() < 2 {
                return Err(EvalError::alias(
                    origin,
                    line_no,
                    "expected a canonical phrase and at least one alternate",
                ));
            }

            table.insert_group(normalized);
        }

        Ok(table)
    }

    fn insert_group(&mut self, phrases: Vec<String>) {
        let mut existing: Vec<usize> = phrases
            .iter()
            .filter_map(|p| self.lookup.get(p).copied())
            .collect();
        existing.sort_unstable();
        existing.dedup();

        let target = match existing.first() {
            Some(&id) => id,
            None => {
                self.groups.push(Some(AliasGroup {
                    canonical: phrases[0].clone(),
                    alternates: BTreeSet::new(),
                }));
                self.groups.len() - 1
            }
        };

        // Groups sharing a phrase collapse into the oldest one.
        for &id in existing.iter().skip(1) {
            if let Some(merged) = self.groups[id].take() {
                for member in merged.members() {
                    self.lookup.insert(member.to_string(), target);
                }
                if let Some(group) = self.groups[target].as_mut() {
                    group.absorb(merged);
                }
            }
        }

        if let Some(group) = self.groups[target].as_mut() {
            for phrase in phrases {
                if phrase != group.canonical {
                    group.alternates.insert(phrase.clone());
                }
                self.lookup.insert(phrase, target);
            }
        }
    }

    /// Group containing `phrase`, normalizing it first.
    pub fn group_of(&self, phrase: &str) -> Option<&AliasGroup> {
        self.group_of_normalized(&normalize(phrase))
    }

    /// Group containing an already-normalized phrase.
    pub fn group_of_normalized(&self, normalized: &str) -> Option<&AliasGroup> {
        self.lookup
            .get(normalized)
            .and_then(|&id| self.groups[id].as_ref())
    }

    /// Number of equivalence groups.
    pub fn len(&self) -> usize {
        self.groups.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

fn split_phrases(line: &str, delimiter: char) -> std::result::Result<Vec<&str>, String> {
    if !line.contains('"') {
        return Ok(line.split(delimiter).map(str::trim).collect());
    }

    if line.matches('"').count() % 2 != 0 {
        return Err("unbalanced quote".to_string());
    }

    let mut phrases = Vec::new();
    for (i, part) in line.split('"').enumerate() {
        if i % 2 == 1 {
            phrases.push(part);
        } else if part.chars().any(|c| !c.is_whitespace() && c != delimiter && c != ',') {
            return Err(format!("unexpected text '{}' outside quotes", part.trim()));
        }
    }
    Ok(phrases)
}
