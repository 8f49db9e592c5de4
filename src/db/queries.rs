use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use rusqlite::Row;
use rusqlite::types::ValueRef;

use super::models::{Entity, Field, HeaderKind, RawTrack, RawValue, TableSummary};
use super::{DbError, MasterDb, Result};
use crate::timefmt;

const CONTENT_TABLE: &str = "djmdContent";

/// Plain `djmdContent` columns backing a field.
const SCALAR_COLUMNS: &[(Field, &str)] = &[
    (Field::Title, "Title"),
    (Field::Bpm, "BPM"),
    (Field::Rating, "Rating"),
    (Field::Comment, "Commnt"),
    (Field::Duration, "Length"),
    (Field::FilePath, "FolderPath"),
    (Field::PlayCount, "DJPlayCount"),
    (Field::UpdatedAt, "updated_at"),
];

/// Fields backed by a lookup table joined on a foreign key.
struct Relation {
    field: Field,
    foreign_key: &'static str,
    table: &'static str,
    name_column: &'static str,
    kind: &'static str,
}

const RELATIONS: &[Relation] = &[
    Relation {
        field: Field::Artist,
        foreign_key: "ArtistID",
        table: "djmdArtist",
        name_column: "Name",
        kind: "DjmdArtist",
    },
    Relation {
        field: Field::Album,
        foreign_key: "AlbumID",
        table: "djmdAlbum",
        name_column: "Name",
        kind: "DjmdAlbum",
    },
    Relation {
        field: Field::Genre,
        foreign_key: "GenreID",
        table: "djmdGenre",
        name_column: "Name",
        kind: "DjmdGenre",
    },
    Relation {
        field: Field::Key,
        foreign_key: "KeyID",
        table: "djmdKey",
        name_column: "ScaleName",
        kind: "DjmdKey",
    },
];

/// One selected attribute and how to decode it from the row.
enum Selected {
    Scalar(Field),
    /// Occupies two result columns: related row ID, then its name.
    Related(&'static Relation),
}

impl MasterDb {
    /// Full scan of `djmdContent`, skipping locally deleted rows.
    ///
    /// The select list is built from the columns actually present, so a
    /// library from an older or newer rekordbox simply yields records with
    /// fewer attributes.
    pub(crate) fn load_content(&self) -> Result<Vec<RawTrack>> {
        let tables = self.table_names()?;
        if !tables.contains(CONTENT_TABLE) {
            return Err(DbError::MissingTable(CONTENT_TABLE));
        }
        let columns = self.table_columns(CONTENT_TABLE)?;

        let mut select = Vec::new();
        let mut joins = Vec::new();
        let mut plan = Vec::new();

        for &(field, column) in SCALAR_COLUMNS {
            if columns.contains(column) {
                select.push(format!("c.{column}"));
                plan.push(Selected::Scalar(field));
            }
        }

        for (i, rel) in RELATIONS.iter().enumerate() {
            if !columns.contains(rel.foreign_key) || !tables.contains(rel.table) {
                continue;
            }
            let related_columns = self.table_columns(rel.table)?;
            if !related_columns.contains("ID") || !related_columns.contains(rel.name_column) {
                continue;
            }
            let alias = format!("r{i}");
            select.push(format!("{alias}.ID"));
            select.push(format!("{alias}.{}", rel.name_column));
            joins.push(format!(
                "LEFT JOIN {} {alias} ON c.{} = {alias}.ID",
                rel.table, rel.foreign_key
            ));
            plan.push(Selected::Related(rel));
        }

        if select.is_empty() {
            select.push("c.rowid".to_string());
        }

        let filter = if columns.contains("rb_local_deleted") {
            " WHERE COALESCE(c.rb_local_deleted, 0) = 0"
        } else {
            ""
        };

        let sql = format!(
            "SELECT {} FROM {CONTENT_TABLE} c {}{filter} ORDER BY c.rowid",
            select.join(", "),
            joins.join(" "),
        );
        log::trace!("content query: {sql}");

        let mut stmt = self.conn.prepare(&sql)?;
        let tracks = stmt
            .query_map([], |row| {
                Ok(row_to_raw(row, &plan).unwrap_or_else(|e| RawTrack::unusable(e.to_string())))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        log::debug!("loaded {} content rows", tracks.len());
        Ok(tracks)
    }

    /// Column and row counts for every table, for the debug report.
    pub fn table_summary(&self) -> Result<Vec<TableSummary>> {
        let mut names: Vec<String> = self.table_names()?.into_iter().collect();
        names.sort();

        let mut summary = Vec::with_capacity(names.len());
        for name in names {
            let columns = self.table_columns(&name)?.len();
            let rows: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM \"{name}\""), [], |row| row.get(0))?;
            summary.push(TableSummary { name, columns, rows });
        }
        Ok(summary)
    }

    fn table_names(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    fn table_columns(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>("name"))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(columns)
    }
}

fn row_to_raw(row: &Row, plan: &[Selected]) -> rusqlite::Result<RawTrack> {
    let mut track = RawTrack::new();
    let mut idx = 0;

    for selected in plan {
        match selected {
            Selected::Scalar(field) => {
                let value = to_raw(row.get_ref(idx)?);
                let value = match (*field, value) {
                    (Field::UpdatedAt, RawValue::Text(s)) => match timefmt::parse_timestamp(&s) {
                        Some(ts) => RawValue::Timestamp(ts),
                        None => RawValue::Text(s),
                    },
                    (_, v) => v,
                };
                track.set(*field, value);
                idx += 1;
            }
            Selected::Related(rel) => {
                let id = to_raw(row.get_ref(idx)?);
                let name = to_raw(row.get_ref(idx + 1)?);
                let value = match id {
                    RawValue::Null => RawValue::Null,
                    id => {
                        let name = match name {
                            RawValue::Null => None,
                            other => Some(other.to_string()),
                        };
                        RawValue::Entity(Entity {
                            kind: rel.kind.to_string(),
                            id: id.to_string(),
                            name,
                        })
                    }
                };
                track.set(rel.field, value);
                idx += 2;
            }
        }
    }

    Ok(track)
}

fn to_raw(value: ValueRef<'_>) -> RawValue {
    match value {
        ValueRef::Null => RawValue::Null,
        ValueRef::Integer(n) => RawValue::Integer(n),
        ValueRef::Real(x) => RawValue::Real(x),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            RawValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Whether the file starts with a plaintext SQLite header.
/// Encrypted (SQLCipher) libraries look like random bytes from offset 0.
pub fn probe_header(path: &Path) -> Result<HeaderKind> {
    let mut header = [0u8; 16];
    let mut file = std::fs::File::open(path)?;
    let read = file.read(&mut header)?;
    if read == header.len() && &header == SQLITE_MAGIC {
        Ok(HeaderKind::Plain)
    } else {
        Ok(HeaderKind::Opaque)
    }
}
