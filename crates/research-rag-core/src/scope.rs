//! Search scope resolution.
//!
//! Translates the caller's scope choice into a [`ScopePredicate`] that is
//! passed, unchanged, to both the lexical index and the vector store so the
//! two ranked lists being fused come from the same restricted universe.
//!
//! | Scope | Predicate |
//! |-------|-----------|
//! | `session` + id | `session_id == id` |
//! | `session`, no id | matches nothing |
//! | `selected` + files | `source_file ∈ files` (empty set matches nothing) |
//! | `all` | no restriction |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RetrievalError;
use crate::models::Chunk;

/// Which subset of the corpus a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    #[default]
    Session,
    Selected,
    All,
}

impl FromStr for ScopeKind {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(ScopeKind::Session),
            "selected" => Ok(ScopeKind::Selected),
            "all" => Ok(ScopeKind::All),
            other => Err(RetrievalError::Scope(format!(
                "unknown scope '{}'. Use session, selected, or all.",
                other
            ))),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeKind::Session => "session",
            ScopeKind::Selected => "selected",
            ScopeKind::All => "all",
        };
        f.write_str(s)
    }
}

/// Metadata filter applied inside both index queries.
///
/// `None` on a field means "unrestricted on that field". An empty
/// `allowed_sources` set matches nothing. `match_nothing` is set when the
/// scope could not be resolved and the query must fail closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopePredicate {
    pub session_id: Option<String>,
    pub allowed_sources: Option<BTreeSet<String>>,
    match_nothing: bool,
}

impl ScopePredicate {
    /// A predicate with no restriction.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// A predicate that rejects every chunk.
    pub fn nothing() -> Self {
        Self {
            match_nothing: true,
            ..Self::default()
        }
    }

    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn for_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_sources: Some(sources.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// True when no chunk can satisfy this predicate.
    pub fn is_empty_universe(&self) -> bool {
        self.match_nothing
            || self
                .allowed_sources
                .as_ref()
                .is_some_and(|sources| sources.is_empty())
    }

    /// True when this predicate does not restrict anything.
    pub fn is_unrestricted(&self) -> bool {
        !self.match_nothing && self.session_id.is_none() && self.allowed_sources.is_none()
    }

    /// Evaluate the predicate against a chunk's metadata.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.matches_fields(chunk.session_id.as_deref(), &chunk.source_file)
    }

    /// Evaluate against raw metadata fields (for stores that do not hold a
    /// full [`Chunk`]).
    pub fn matches_fields(&self, session_id: Option<&str>, source_file: &str) -> bool {
        if self.match_nothing {
            return false;
        }
        if let Some(want) = &self.session_id {
            if session_id != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(sources) = &self.allowed_sources {
            if !sources.contains(source_file) {
                return false;
            }
        }
        true
    }
}

/// Resolve a scope request into a predicate.
///
/// Never fails: an unresolvable scope (session scope without a session id)
/// yields [`ScopePredicate::nothing`], so the caller gets "no results"
/// rather than a silently widened search.
pub fn resolve(
    kind: ScopeKind,
    session_id: Option<&str>,
    selected_sources: Option<&[String]>,
) -> ScopePredicate {
    match kind {
        ScopeKind::Session => match session_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => ScopePredicate::for_session(id),
            None => {
                let err = RetrievalError::Scope("session scope requires a session id".into());
                debug!(error = %err, "resolving to empty scope");
                ScopePredicate::nothing()
            }
        },
        ScopeKind::Selected => {
            ScopePredicate::for_sources(selected_sources.unwrap_or_default().iter().cloned())
        }
        ScopeKind::All => ScopePredicate::unrestricted(),
    }
}
