use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::db::models::{Field, RawTrackRecord, RawValue, RecordError};
use crate::diagnostics::Diagnostics;
use crate::timefmt;

// Key token inside the key's string form, e.g. `<DjmdKey(ID=12, Name=Am)>`.
static KEY_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Name=([^)]+)").unwrap());

/// Normalized track info handed to consumers. Every field is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub bpm: f64,
    pub key: String,
    pub rating: i64,
    pub comment: String,
    /// Seconds.
    pub duration: i64,
    pub file_path: String,
    /// `YYYY-MM-DD HH:MM:SS`, `None` when the record has no update timestamp.
    pub last_played: Option<String>,
    pub play_count: i64,
}

/// Why a single field fell back to its default.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("{field}: expected {expected}, found {found}")]
    Mismatch {
        field: Field,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{field}: {value:?} is not numeric")]
    NotNumeric { field: Field, value: String },
    #[error("{field}: unrecognized timestamp {value:?}")]
    BadTimestamp { field: Field, value: String },
}

/// Converts raw library records into [`TrackInfo`]. Never fails.
#[derive(Debug, Clone)]
pub struct TrackFormatter {
    diag: Diagnostics,
}

impl Default for TrackFormatter {
    fn default() -> Self {
        Self::new(Diagnostics::global(concat!(env!("CARGO_PKG_NAME"), "::formatter")))
    }
}

impl TrackFormatter {
    pub fn new(diag: Diagnostics) -> Self {
        Self { diag }
    }

    /// Normalize one record.
    ///
    /// Each field defaults independently when its value is missing or
    /// malformed. If the record itself turns out to be unusable, the result is
    /// the all-default record; the title is read before anything else and is
    /// kept in that case when it could be obtained.
    pub fn format<R: RawTrackRecord + ?Sized>(&self, raw: &R) -> TrackInfo {
        let title = self.settle(Field::Title, extract_text(raw, Field::Title));

        match self.format_fields(raw) {
            Ok(mut info) => {
                info.title = title.unwrap_or_default();
                self.diag.debug(format_args!(
                    "formatted track {:?} by {:?}",
                    info.title, info.artist
                ));
                info
            }
            Err(e) => {
                self.diag.error(format_args!("error formatting track info: {e}"));
                TrackInfo {
                    title: title.unwrap_or_default(),
                    ..TrackInfo::default()
                }
            }
        }
    }

    fn format_fields<R: RawTrackRecord + ?Sized>(&self, raw: &R) -> Result<TrackInfo, RecordError> {
        Ok(TrackInfo {
            title: String::new(),
            artist: self.settle(Field::Artist, extract_name(raw, Field::Artist))?,
            album: self.settle(Field::Album, extract_name(raw, Field::Album))?,
            genre: self.settle(Field::Genre, extract_name(raw, Field::Genre))?,
            bpm: self.settle(Field::Bpm, extract_bpm(raw))?,
            key: self.settle(Field::Key, extract_key(raw))?,
            rating: self.settle(Field::Rating, extract_integer(raw, Field::Rating))?,
            comment: self.settle(Field::Comment, extract_text(raw, Field::Comment))?,
            duration: self.settle(Field::Duration, extract_integer(raw, Field::Duration))?,
            file_path: self.settle(Field::FilePath, extract_text(raw, Field::FilePath))?,
            last_played: self.settle(Field::UpdatedAt, extract_last_played(raw))?,
            play_count: self.settle(Field::PlayCount, extract_integer(raw, Field::PlayCount))?,
        })
    }

    /// Resolve one field: value on success, default on a field-level failure,
    /// and propagate record-level failures.
    fn settle<T: Default>(
        &self,
        field: Field,
        result: Result<T, ExtractionError>,
    ) -> Result<T, RecordError> {
        match result {
            Ok(value) => Ok(value),
            Err(ExtractionError::Record(e)) => Err(e),
            Err(e) => {
                self.diag.warn(format_args!("{e}; using default for {field}"));
                Ok(T::default())
            }
        }
    }
}

/// Last-updated timestamp of a record, if it has a usable one.
pub fn updated_at<R: RawTrackRecord + ?Sized>(raw: &R) -> Option<NaiveDateTime> {
    match raw.attribute(Field::UpdatedAt) {
        Ok(Some(RawValue::Timestamp(ts))) => Some(*ts),
        Ok(Some(RawValue::Text(s))) => timefmt::parse_timestamp(s),
        _ => None,
    }
}

fn probe<R: RawTrackRecord + ?Sized>(
    raw: &R,
    field: Field,
) -> Result<Option<&RawValue>, ExtractionError> {
    match raw.attribute(field)? {
        None | Some(RawValue::Null) => Ok(None),
        Some(value) => Ok(Some(value)),
    }
}

fn mismatch(field: Field, expected: &'static str, found: &RawValue) -> ExtractionError {
    ExtractionError::Mismatch {
        field,
        expected,
        found: found.kind(),
    }
}

fn extract_text<R: RawTrackRecord + ?Sized>(raw: &R, field: Field) -> Result<String, ExtractionError> {
    match probe(raw, field)? {
        None => Ok(String::new()),
        Some(RawValue::Text(s)) => Ok(s.clone()),
        Some(v @ (RawValue::Integer(_) | RawValue::Real(_))) => Ok(v.to_string()),
        Some(other) => Err(mismatch(field, "text", other)),
    }
}

/// Name of a related row (artist, album, genre).
fn extract_name<R: RawTrackRecord + ?Sized>(raw: &R, field: Field) -> Result<String, ExtractionError> {
    match probe(raw, field)? {
        None => Ok(String::new()),
        Some(RawValue::Entity(e)) => Ok(e.name.clone().unwrap_or_default()),
        Some(RawValue::Text(s)) => Ok(s.clone()),
        Some(other) => Err(mismatch(field, "entity", other)),
    }
}

fn as_f64(field: Field, value: &RawValue) -> Result<f64, ExtractionError> {
    match value {
        RawValue::Integer(n) => Ok(*n as f64),
        RawValue::Real(x) => Ok(*x),
        RawValue::Text(s) => s.trim().parse::<f64>().map_err(|_| ExtractionError::NotNumeric {
            field,
            value: s.clone(),
        }),
        other => Err(mismatch(field, "number", other)),
    }
}

/// BPM is stored scaled by 100.
fn extract_bpm<R: RawTrackRecord + ?Sized>(raw: &R) -> Result<f64, ExtractionError> {
    let Some(value) = probe(raw, Field::Bpm)? else {
        return Ok(0.0);
    };
    let scaled = as_f64(Field::Bpm, value)?;
    if !scaled.is_finite() || scaled <= 0.0 {
        return Ok(0.0);
    }
    let bpm = scaled / 100.0;
    Ok((bpm * 100.0).round() / 100.0)
}

fn extract_key<R: RawTrackRecord + ?Sized>(raw: &R) -> Result<String, ExtractionError> {
    let Some(value) = probe(raw, Field::Key)? else {
        return Ok(String::new());
    };
    let repr = value.to_string();
    Ok(KEY_NAME_RE
        .captures(&repr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default())
}

fn extract_integer<R: RawTrackRecord + ?Sized>(raw: &R, field: Field) -> Result<i64, ExtractionError> {
    match probe(raw, field)? {
        None => Ok(0),
        Some(RawValue::Integer(n)) => Ok(*n),
        Some(RawValue::Real(x)) if x.is_finite() => Ok(x.trunc() as i64),
        Some(RawValue::Text(s)) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(0);
            }
            t.parse::<i64>()
                .or_else(|_| t.parse::<f64>().map(|x| x.trunc() as i64))
                .map_err(|_| ExtractionError::NotNumeric {
                    field,
                    value: s.clone(),
                })
        }
        Some(other) => Err(mismatch(field, "integer", other)),
    }
}

fn extract_last_played<R: RawTrackRecord + ?Sized>(raw: &R) -> Result<Option<String>, ExtractionError> {
    match probe(raw, Field::UpdatedAt)? {
        None => Ok(None),
        Some(RawValue::Timestamp(ts)) => Ok(Some(timefmt::format_timestamp(ts))),
        Some(RawValue::Text(s)) => timefmt::parse_timestamp(s)
            .map(|ts| Some(timefmt::format_timestamp(&ts)))
            .ok_or_else(|| ExtractionError::BadTimestamp {
                field: Field::UpdatedAt,
                value: s.clone(),
            }),
        Some(other) => Err(mismatch(Field::UpdatedAt, "timestamp", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Entity, RawTrack};
    use crate::diagnostics::capture;
    use chrono::NaiveDate;
    use log::Level;

    fn formatter() -> (std::sync::Arc<capture::CaptureLogger>, TrackFormatter) {
        let (logger, diag) = capture::diagnostics("rbcast::formatter");
        (logger, TrackFormatter::new(diag))
    }

    fn full_track() -> RawTrack {
        let played = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(21, 15, 4)
            .unwrap();
        RawTrack::new()
            .with(Field::Title, RawValue::text("Archangel"))
            .with(Field::Artist, RawValue::Entity(Entity::new("DjmdArtist", "a1", Some("Burial"))))
            .with(Field::Album, RawValue::Entity(Entity::new("DjmdAlbum", "al1", Some("Untrue"))))
            .with(Field::Genre, RawValue::Entity(Entity::new("DjmdGenre", "g1", Some("Dubstep"))))
            .with(Field::Bpm, RawValue::Integer(13950))
            .with(Field::Key, RawValue::Entity(Entity::new("DjmdKey", "k1", Some("Am"))))
            .with(Field::Rating, RawValue::Integer(204))
            .with(Field::Comment, RawValue::text("iconic garage vocal"))
            .with(Field::Duration, RawValue::Integer(240))
            .with(Field::FilePath, RawValue::text("/music/Burial/01 Archangel.flac"))
            .with(Field::UpdatedAt, RawValue::Timestamp(played))
            .with(Field::PlayCount, RawValue::text("12"))
    }

    /// Title readable, everything else fails at the record level.
    struct HalfDetached {
        title: RawValue,
    }

    impl RawTrackRecord for HalfDetached {
        fn attribute(&self, field: Field) -> Result<Option<&RawValue>, RecordError> {
            match field {
                Field::Title => Ok(Some(&self.title)),
                _ => Err(RecordError::Unusable("session closed".into())),
            }
        }
    }

    #[test]
    fn test_full_record() {
        let (_, f) = formatter();
        let info = f.format(&full_track());
        assert_eq!(
            info,
            TrackInfo {
                title: "Archangel".into(),
                artist: "Burial".into(),
                album: "Untrue".into(),
                genre: "Dubstep".into(),
                bpm: 139.5,
                key: "Am".into(),
                rating: 204,
                comment: "iconic garage vocal".into(),
                duration: 240,
                file_path: "/music/Burial/01 Archangel.flac".into(),
                last_played: Some("2024-03-01 21:15:04".into()),
                play_count: 12,
            }
        );
    }

    #[test]
    fn test_no_attributes_is_all_default() {
        let (_, f) = formatter();
        assert_eq!(f.format(&RawTrack::new()), TrackInfo::default());
    }

    #[test]
    fn test_only_title_present() {
        let (_, f) = formatter();
        let info = f.format(&RawTrack::new().with(Field::Title, RawValue::text("Minimal Track")));
        assert_eq!(
            info,
            TrackInfo {
                title: "Minimal Track".into(),
                ..TrackInfo::default()
            }
        );
    }

    #[test]
    fn test_null_attributes_default() {
        let (_, f) = formatter();
        let mut raw = RawTrack::new().with(Field::Title, RawValue::text("Minimal Track"));
        for field in Field::ALL.into_iter().skip(1) {
            raw.set(field, RawValue::Null);
        }
        let info = f.format(&raw);
        assert_eq!(info.title, "Minimal Track");
        assert_eq!(info.artist, "");
        assert_eq!(info.bpm, 0.0);
        assert_eq!(info.key, "");
        assert_eq!(info.last_played, None);
        assert_eq!(info.play_count, 0);
    }

    #[test]
    fn test_bpm_scaling() {
        let (_, f) = formatter();
        let bpm = |v: RawValue| f.format(&RawTrack::new().with(Field::Bpm, v)).bpm;
        assert_eq!(bpm(RawValue::Integer(12800)), 128.0);
        assert_eq!(bpm(RawValue::Integer(12345)), 123.45);
        assert_eq!(bpm(RawValue::Real(12799.6)), 128.0);
        assert_eq!(bpm(RawValue::text("17400")), 174.0);
        assert_eq!(bpm(RawValue::Integer(0)), 0.0);
        assert_eq!(bpm(RawValue::Integer(-500)), 0.0);
        assert_eq!(bpm(RawValue::text("invalid")), 0.0);
    }

    #[test]
    fn test_invalid_bpm_only_defaults_that_field() {
        let (logger, f) = formatter();
        let raw = RawTrack::new()
            .with(Field::Title, RawValue::text("Invalid BPM Track"))
            .with(Field::Bpm, RawValue::text("invalid"))
            .with(Field::Duration, RawValue::Integer(300));
        let info = f.format(&raw);
        assert_eq!(info.title, "Invalid BPM Track");
        assert_eq!(info.bpm, 0.0);
        assert_eq!(info.duration, 300);
        assert!(logger.contains(Level::Warn, "bpm"));
    }

    #[test]
    fn test_key_extraction() {
        let (_, f) = formatter();
        let key = |v: RawValue| f.format(&RawTrack::new().with(Field::Key, v)).key;
        assert_eq!(key(RawValue::text("Name=Cm")), "Cm");
        assert_eq!(key(RawValue::Entity(Entity::new("DjmdKey", "7", Some("F#m")))), "F#m");
        assert_eq!(key(RawValue::text("8A")), "");
        assert_eq!(key(RawValue::Null), "");
        assert_eq!(f.format(&RawTrack::new()).key, "");
    }

    #[test]
    fn test_nameless_entity_yields_empty_name() {
        let (_, f) = formatter();
        let raw = RawTrack::new().with(Field::Artist, RawValue::Entity(Entity::new("DjmdArtist", "a9", None)));
        assert_eq!(f.format(&raw).artist, "");
    }

    #[test]
    fn test_type_mismatch_defaults_field() {
        let (_, f) = formatter();
        let raw = RawTrack::new()
            .with(Field::Comment, RawValue::Entity(Entity::new("DjmdArtist", "a1", Some("x"))))
            .with(Field::Rating, RawValue::text("five"))
            .with(Field::Genre, RawValue::Integer(3));
        let info = f.format(&raw);
        assert_eq!(info.comment, "");
        assert_eq!(info.rating, 0);
        assert_eq!(info.genre, "");
    }

    #[test]
    fn test_last_played_from_text() {
        let (_, f) = formatter();
        let raw = RawTrack::new().with(Field::UpdatedAt, RawValue::text("2024-03-01 21:15:04.512"));
        assert_eq!(f.format(&raw).last_played.as_deref(), Some("2024-03-01 21:15:04"));

        let bad = RawTrack::new().with(Field::UpdatedAt, RawValue::text("last tuesday"));
        assert_eq!(f.format(&bad).last_played, None);
    }

    #[test]
    fn test_unusable_record_collapses_to_defaults() {
        let (logger, f) = formatter();
        assert_eq!(f.format(&RawTrack::unusable("decode failed")), TrackInfo::default());
        assert_eq!(logger.count(Level::Error), 1);
    }

    #[test]
    fn test_title_survives_record_failure() {
        let (logger, f) = formatter();
        let raw = HalfDetached {
            title: RawValue::text("Kept Title"),
        };
        assert_eq!(
            f.format(&raw),
            TrackInfo {
                title: "Kept Title".into(),
                ..TrackInfo::default()
            }
        );
        assert!(logger.contains(Level::Error, "session closed"));
    }

    #[test]
    fn test_updated_at_helper() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        assert_eq!(updated_at(&RawTrack::new().with(Field::UpdatedAt, RawValue::Timestamp(ts))), Some(ts));
        assert_eq!(
            updated_at(&RawTrack::new().with(Field::UpdatedAt, RawValue::text("2024-01-02 03:04:05"))),
            Some(ts)
        );
        assert_eq!(updated_at(&RawTrack::new().with(Field::UpdatedAt, RawValue::Null)), None);
        assert_eq!(updated_at(&RawTrack::unusable("x")), None);
    }

    #[test]
    fn test_serializes_with_stable_field_names() {
        let json = serde_json::to_value(TrackInfo::default()).unwrap();
        let obj = json.as_object().unwrap();
        for name in [
            "title", "artist", "album", "genre", "bpm", "key", "rating", "comment", "duration",
            "file_path", "last_played", "play_count",
        ] {
            assert!(obj.contains_key(name), "missing {name}");
        }
        assert!(obj["last_played"].is_null());
    }
}
