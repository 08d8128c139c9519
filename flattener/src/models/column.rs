//! Column definitions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::tree::GroupId;
use crate::error::{ConfigError, ConfigResult, ResolveError, ResolveResult};
use crate::xpath::Selector;

/// Literal sources replaced by the batch timestamp (case-insensitive).
pub const BATCH_TIME_TOKEN: &str = "batchTime";
pub const CURRENT_TIME_TOKEN: &str = "currentTime";

// =============================================================================
// Source Kind
// =============================================================================

/// Where a column's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Selection expression evaluated per document.
    Expression,
    /// Fixed text, or the batch time.
    Literal,
    /// Template expanded into one column per matching attribute name.
    DynamicAttribute,
    /// Reserved; resolving it is an error.
    DynamicElement,
}

impl SourceKind {
    /// Parse a `sourceType` value from a specification file.
    pub fn from_config(value: &str) -> Option<Self> {
        match value.trim() {
            "xpath" | "expression" => Some(Self::Expression),
            "eval" | "literal" => Some(Self::Literal),
            "dynAttribute" | "dynamicAttribute" => Some(Self::DynamicAttribute),
            "dynElement" | "dynamicElement" => Some(Self::DynamicElement),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expression => "xpath",
            Self::Literal => "eval",
            Self::DynamicAttribute => "dynAttribute",
            Self::DynamicElement => "dynElement",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Column
// =============================================================================

/// One output column.
///
/// Identity is `(name, kind, source)`; ordering is `(sequence, name)`, which
/// is the canonical CSV column order. A dynamic-attribute column also owns
/// the concrete columns discovered for it, keyed by attribute name.
#[derive(Debug)]
pub struct Column {
    name: String,
    kind: SourceKind,
    source: String,
    selector: Option<Selector>,
    level: usize,
    group: Option<GroupId>,
    sequence: usize,
    attribute_filter: Option<Regex>,
    resolved: RwLock<BTreeMap<String, Arc<Column>>>,
}

impl Column {
    /// Build a column, compiling its expression when the kind needs one.
    pub fn new(
        name: impl Into<String>,
        kind: SourceKind,
        source: impl Into<String>,
        level: usize,
        group: Option<GroupId>,
        sequence: usize,
    ) -> ConfigResult<Self> {
        let name = name.into();
        let source = source.into();
        let selector = match kind {
            SourceKind::Expression | SourceKind::DynamicAttribute => Some(
                Selector::compile(&source).map_err(|e| ConfigError::InvalidExpression {
                    owner: name.clone(),
                    expression: source.clone(),
                    source: e,
                })?,
            ),
            SourceKind::Literal | SourceKind::DynamicElement => None,
        };
        Ok(Self {
            name,
            kind,
            source,
            selector,
            level,
            group,
            sequence,
            attribute_filter: None,
            resolved: RwLock::new(BTreeMap::new()),
        })
    }

    /// Attach the attribute-name pattern of a dynamic-attribute column. The
    /// pattern must match the whole attribute name.
    pub fn with_attribute_filter(mut self, pattern: &str) -> ConfigResult<Self> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored).map_err(|e| ConfigError::InvalidAttributeFilter {
            column: self.name.clone(),
            filter: pattern.to_string(),
            source: e,
        })?;
        self.attribute_filter = Some(regex);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn selector(&self) -> Option<&Selector> {
        self.selector.as_ref()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == SourceKind::DynamicAttribute
    }

    /// Value of a literal column.
    pub fn literal_value(&self, batch_time: &str) -> String {
        let token = self.source.trim();
        if token.eq_ignore_ascii_case(BATCH_TIME_TOKEN)
            || token.eq_ignore_ascii_case(CURRENT_TIME_TOKEN)
        {
            batch_time.to_string()
        } else {
            self.source.clone()
        }
    }

    /// True when `attribute` passes the attribute filter.
    pub fn accepts_attribute(&self, attribute: &str) -> bool {
        self.attribute_filter
            .as_ref()
            .map(|re| re.is_match(attribute))
            .unwrap_or(false)
    }

    /// Register a resolved column for `attribute` unless one exists.
    ///
    /// Returns `true` when a new column was added.
    pub fn add_resolved(&self, attribute: &str) -> ResolveResult<bool> {
        if !self.is_dynamic() {
            return Err(ResolveError::NotDynamic(self.name.clone()));
        }
        if self.read_resolved().contains_key(attribute) {
            return Ok(false);
        }

        let source = if self.source.trim().is_empty() {
            format!("{}@{}", self.source, attribute)
        } else {
            format!("{}/@{}", self.source, attribute)
        };
        let selector = Selector::compile(&source).map_err(|e| ResolveError::Evaluation {
            owner_kind: "column",
            name: self.name.clone(),
            expression: source.clone(),
            level: self.level,
            source: e,
        })?;
        let column = Column {
            name: format!("{}_{}", self.name, attribute),
            kind: SourceKind::Expression,
            source,
            selector: Some(selector),
            level: self.level,
            group: self.group,
            sequence: self.sequence,
            attribute_filter: None,
            resolved: RwLock::new(BTreeMap::new()),
        };

        let mut resolved = self.resolved.write().unwrap_or_else(|e| e.into_inner());
        if resolved.contains_key(attribute) {
            return Ok(false);
        }
        resolved.insert(attribute.to_string(), Arc::new(column));
        Ok(true)
    }

    /// Resolved columns, ordered by attribute name.
    pub fn resolved_columns(&self) -> Vec<Arc<Column>> {
        self.read_resolved().values().cloned().collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.read_resolved().len()
    }

    fn read_resolved(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<Column>>> {
        self.resolved.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.source == other.source
    }
}

impl Eq for Column {}

impl PartialOrd for Column {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Column {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}: '{}', level {}]",
            self.name, self.kind, self.source, self.level
        )
    }
}
