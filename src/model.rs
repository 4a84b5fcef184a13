use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.hyphenated().fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(raw.trim()).map(Self)
            }
        }
    };
}

id_type!(NoteId);
id_type!(NotebookId);
id_type!(TagId);
id_type!(
    /// Stable identity of the authenticated user; every row is scoped to one.
    OwnerId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub owner: OwnerId,
    pub notebook_id: NotebookId,
    pub title: String,
    /// Rich-text HTML, opaque to everything except [`crate::snippet`].
    pub content: String,
    pub snippet: String,
    pub tags: BTreeSet<TagId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Note {
    pub fn field(&self, field: NoteField) -> FieldValue {
        match field {
            NoteField::Title => FieldValue::Title(self.title.clone()),
            NoteField::Content => FieldValue::Content(self.content.clone()),
            NoteField::Tags => FieldValue::Tags(self.tags.clone()),
        }
    }

    /// Writes a field locally; content writes keep the snippet derived.
    pub fn set_field(&mut self, value: FieldValue) {
        match value {
            FieldValue::Title(title) => self.title = title,
            FieldValue::Content(content) => {
                self.snippet = crate::snippet::snippet(&content);
                self.content = content;
            }
            FieldValue::Tags(tags) => self.tags = tags,
        }
    }

    pub fn has_tag(&self, tag: TagId) -> bool {
        self.tags.contains(&tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub id: NotebookId,
    pub owner: OwnerId,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub owner: OwnerId,
    pub name: String,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Join row between a note and a tag. Has no identity of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteTag {
    pub note_id: NoteId,
    pub tag_id: TagId,
}

/// Editable note fields, each with its own autosave stream.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum NoteField {
    Title,
    Content,
    Tags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Title(String),
    Content(String),
    Tags(BTreeSet<TagId>),
}

impl FieldValue {
    pub fn field(&self) -> NoteField {
        match self {
            FieldValue::Title(_) => NoteField::Title,
            FieldValue::Content(_) => NoteField::Content,
            FieldValue::Tags(_) => NoteField::Tags,
        }
    }

    pub fn into_update(self) -> NoteUpdate {
        let mut update = NoteUpdate::default();
        match self {
            FieldValue::Title(title) => update.title = Some(title),
            FieldValue::Content(content) => update.content = Some(content),
            FieldValue::Tags(tags) => update.tags = Some(tags),
        }
        update
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub title: String,
    /// Falls back to the owner's first notebook when absent.
    pub notebook_id: Option<NotebookId>,
    pub content: String,
    pub tags: BTreeSet<TagId>,
}

impl NewNote {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn in_notebook(mut self, notebook_id: NotebookId) -> Self {
        self.notebook_id = Some(notebook_id);
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagId>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }
}

/// Partial note write. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<BTreeSet<TagId>>,
    pub notebook_id: Option<NotebookId>,
}

impl NoteUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.notebook_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_note() -> Note {
        Note {
            id: NoteId::new(),
            owner: OwnerId::new(),
            notebook_id: NotebookId::new(),
            title: "Draft".into(),
            content: String::new(),
            snippet: crate::snippet::EMPTY_SNIPPET.into(),
            tags: BTreeSet::new(),
            created_at: datetime!(2024-03-01 09:00 UTC),
            updated_at: datetime!(2024-03-01 09:00 UTC),
        }
    }

    #[test]
    fn ids_round_trip_through_display() {
        let id = NoteId::new();
        let parsed: NoteId = id.to_string().parse().expect("parse id");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<TagId>().is_err());
    }

    #[test]
    fn content_writes_recompute_snippet() {
        let mut note = sample_note();
        note.set_field(FieldValue::Content("<p>Hello <b>world</b></p>".into()));
        assert_eq!(note.snippet, "Hello world");
        assert_eq!(
            note.field(NoteField::Content),
            FieldValue::Content("<p>Hello <b>world</b></p>".into())
        );
    }

    #[test]
    fn field_value_builds_single_field_update() {
        let update = FieldValue::Title("AB".into()).into_update();
        assert_eq!(update.title.as_deref(), Some("AB"));
        assert!(update.content.is_none() && update.tags.is_none());
        assert!(NoteUpdate::default().is_empty());
    }

    #[test]
    fn note_field_names_are_lowercase() {
        assert_eq!(NoteField::Content.to_string(), "content");
        assert_eq!("tags".parse::<NoteField>().ok(), Some(NoteField::Tags));
    }
}
