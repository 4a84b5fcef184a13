use std::fmt;
use std::str::FromStr;

use crate::model::{Note, Notebook, NotebookId, Tag, TagId};

pub const ALL_NOTES_TITLE: &str = "All Notes";
pub const FALLBACK_TITLE: &str = "Notes";

/// Which slice of the collection the list shows. Parsed from and printed as
/// `all`, `notebook:<id>` or `tag:<id>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ActiveFilter {
    #[default]
    All,
    Notebook(NotebookId),
    Tag(TagId),
}

impl ActiveFilter {
    pub fn matches(&self, note: &Note) -> bool {
        match self {
            ActiveFilter::All => true,
            ActiveFilter::Notebook(id) => note.notebook_id == *id,
            ActiveFilter::Tag(id) => note.has_tag(*id),
        }
    }
}

impl fmt::Display for ActiveFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveFilter::All => f.write_str("all"),
            ActiveFilter::Notebook(id) => write!(f, "notebook:{id}"),
            ActiveFilter::Tag(id) => write!(f, "tag:{id}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterParseError {
    #[error("unknown filter `{0}`; expected all, notebook:<id> or tag:<id>")]
    Unknown(String),
    #[error("invalid id in filter `{raw}`: {source}")]
    BadId { raw: String, source: uuid::Error },
}

impl FromStr for ActiveFilter {
    type Err = FilterParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(ActiveFilter::All);
        }
        let bad_id = |source| FilterParseError::BadId {
            raw: trimmed.to_string(),
            source,
        };
        if let Some(id) = trimmed.strip_prefix("notebook:") {
            return id.parse().map(ActiveFilter::Notebook).map_err(bad_id);
        }
        if let Some(id) = trimmed.strip_prefix("tag:") {
            return id.parse().map(ActiveFilter::Tag).map_err(bad_id);
        }
        Err(FilterParseError::Unknown(trimmed.to_string()))
    }
}

/// Case-insensitive substring match on title or snippet. A blank query
/// matches everything.
pub fn matches_query(note: &Note, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    note.title.to_lowercase().contains(&needle) || note.snippet.to_lowercase().contains(&needle)
}

/// Membership filter first, then the text query. Input order is preserved.
pub fn filter_notes<'a, I>(notes: I, filter: &ActiveFilter, query: &str) -> Vec<&'a Note>
where
    I: IntoIterator<Item = &'a Note>,
{
    notes
        .into_iter()
        .filter(|note| filter.matches(note))
        .filter(|note| matches_query(note, query))
        .collect()
}

pub fn list_title<'a, N, T>(filter: &ActiveFilter, notebooks: N, tags: T) -> String
where
    N: IntoIterator<Item = &'a Notebook>,
    T: IntoIterator<Item = &'a Tag>,
{
    match filter {
        ActiveFilter::All => ALL_NOTES_TITLE.to_string(),
        ActiveFilter::Notebook(id) => notebooks
            .into_iter()
            .find(|notebook| notebook.id == *id)
            .map(|notebook| notebook.name.clone())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
        ActiveFilter::Tag(id) => tags
            .into_iter()
            .find(|tag| tag.id == *id)
            .map(|tag| format!("#{}", tag.name))
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
    }
}
