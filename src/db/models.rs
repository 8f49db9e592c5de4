use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Attributes a raw track record may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Title,
    Artist,
    Album,
    Genre,
    Bpm,
    Key,
    Rating,
    Comment,
    Duration,
    FilePath,
    UpdatedAt,
    PlayCount,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Title,
        Field::Artist,
        Field::Album,
        Field::Genre,
        Field::Bpm,
        Field::Key,
        Field::Rating,
        Field::Comment,
        Field::Duration,
        Field::FilePath,
        Field::UpdatedAt,
        Field::PlayCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Genre => "genre",
            Self::Bpm => "bpm",
            Self::Key => "key",
            Self::Rating => "rating",
            Self::Comment => "comment",
            Self::Duration => "duration",
            Self::FilePath => "file_path",
            Self::UpdatedAt => "updated_at",
            Self::PlayCount => "play_count",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A related row (artist, album, genre, key) referenced by a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: String,
    pub id: String,
    pub name: Option<String>,
}

impl Entity {
    pub fn new(kind: &str, id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            id: id.into(),
            name: name.map(str::to_string),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}(ID={}, Name={})>",
            self.kind,
            self.id,
            self.name.as_deref().unwrap_or("None")
        )
    }
}

/// A loosely typed attribute value as stored in the library.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Entity(Entity),
}

impl RawValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Entity(_) => "entity",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Real(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", crate::timefmt::format_timestamp(ts)),
            Self::Entity(e) => write!(f, "{e}"),
        }
    }
}

/// The record object itself cannot be read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("record is unusable: {0}")]
    Unusable(String),
}

/// Capability view over one track row.
///
/// `Ok(None)` means the attribute is absent, `Ok(Some(RawValue::Null))` means
/// it is present but null. An `Err` means the record as a whole is broken.
pub trait RawTrackRecord {
    fn attribute(&self, field: Field) -> Result<Option<&RawValue>, RecordError>;
}

/// Owned raw record materialized from a library row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrack {
    attrs: BTreeMap<Field, RawValue>,
    defect: Option<String>,
}

impl RawTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record whose every probe fails, e.g. a row that could not be decoded.
    pub fn unusable(reason: impl Into<String>) -> Self {
        Self {
            attrs: BTreeMap::new(),
            defect: Some(reason.into()),
        }
    }

    pub fn with(mut self, field: Field, value: RawValue) -> Self {
        self.attrs.insert(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: RawValue) {
        self.attrs.insert(field, value);
    }

    pub fn is_unusable(&self) -> bool {
        self.defect.is_some()
    }
}

impl RawTrackRecord for RawTrack {
    fn attribute(&self, field: Field) -> Result<Option<&RawValue>, RecordError> {
        match &self.defect {
            Some(reason) => Err(RecordError::Unusable(reason.clone())),
            None => Ok(self.attrs.get(&field)),
        }
    }
}

/// First bytes of a library file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Plaintext SQLite.
    Plain,
    /// Encrypted, or not a database at all.
    Opaque,
}

/// One row of the debug report.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub columns: usize,
    pub rows: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_null_are_distinct() {
        let t = RawTrack::new().with(Field::Comment, RawValue::Null);
        assert_eq!(t.attribute(Field::Title).unwrap(), None);
        assert_eq!(t.attribute(Field::Comment).unwrap(), Some(&RawValue::Null));
    }

    #[test]
    fn test_unusable_record_fails_every_probe() {
        let t = RawTrack::unusable("row decode failed");
        for field in Field::ALL {
            assert!(t.attribute(field).is_err());
        }
    }

    #[test]
    fn test_entity_string_form_embeds_name_token() {
        let key = Entity::new("DjmdKey", "k1", Some("Cm"));
        assert_eq!(key.to_string(), "<DjmdKey(ID=k1, Name=Cm)>");
        let nameless = Entity::new("DjmdKey", "k2", None);
        assert_eq!(nameless.to_string(), "<DjmdKey(ID=k2, Name=None)>");
    }
}
