use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::diagnostics::Diagnostics;
use crate::formatter::TrackInfo;
use crate::timefmt;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

pub const DEFAULT_TEMPLATE: &str = "{artist} - {title}";

/// Request shapes a text source may accept, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// Generic input settings update (`inputName`, `inputSettings.text`).
    InputSettings,
    /// Legacy FreeType 2 text properties (`source`, `text`).
    Freetype2Properties,
    /// Legacy source settings update (`sourceName`, `sourceSettings.text`).
    SourceSettings,
}

impl CallShape {
    pub const ALL: [CallShape; 3] = [
        CallShape::InputSettings,
        CallShape::Freetype2Properties,
        CallShape::SourceSettings,
    ];
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InputSettings => "SetInputSettings",
            Self::Freetype2Properties => "SetTextFreetype2Properties",
            Self::SourceSettings => "SetSourceSettings",
        })
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{0} is not supported by this sink")]
    Unsupported(CallShape),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for overlay text, addressed by source name.
pub trait TextSink {
    fn update_text(&mut self, shape: CallShape, source: &str, text: &str) -> Result<(), SinkError>;
}

/// Writes each source's text to `<dir>/<source>.txt`.
///
/// Broadcast text sources can read from a file, so every call shape maps to
/// the same write. The file is replaced atomically so a reader never sees a
/// half-written line.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source: &str) -> PathBuf {
        let name: String = source
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.txt"))
    }
}

impl TextSink for FileSink {
    fn update_text(&mut self, _shape: CallShape, source: &str, text: &str) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(source);
        let tmp = path.with_extension("txt.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Fill `{field}` placeholders from a track. Unknown placeholders stay as is.
/// A track without a title renders blank.
pub fn render(template: &str, track: &TrackInfo) -> String {
    if track.title.is_empty() {
        return String::new();
    }
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "title" => track.title.clone(),
            "artist" => track.artist.clone(),
            "album" => track.album.clone(),
            "genre" => track.genre.clone(),
            "bpm" => format!("{:.2}", track.bpm),
            "key" => track.key.clone(),
            "rating" => track.rating.to_string(),
            "comment" => track.comment.clone(),
            "duration" => timefmt::format_duration(track.duration),
            "file_path" => track.file_path.clone(),
            "last_played" => track.last_played.clone().unwrap_or_default(),
            "play_count" => track.play_count.to_string(),
            _ => caps[0].to_string(),
        })
        .trim()
        .to_string()
}

/// Pushes the rendered current track to a text sink.
///
/// Failures are logged and never propagate; the overlay just keeps whatever
/// it showed last.
pub struct NowPlayingUpdater<S: TextSink> {
    sink: S,
    source_name: String,
    template: String,
    last_text: Option<String>,
    diag: Diagnostics,
}

impl<S: TextSink> NowPlayingUpdater<S> {
    pub fn new(sink: S, source_name: impl Into<String>, template: impl Into<String>, diag: Diagnostics) -> Self {
        Self {
            sink,
            source_name: source_name.into(),
            template: template.into(),
            last_text: None,
            diag,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn last_text(&self) -> Option<&str> {
        self.last_text.as_deref()
    }

    /// Returns true when the sink accepted new text.
    ///
    /// `None` keeps the stale display. Text identical to the last accepted
    /// update is not re-sent.
    pub fn publish(&mut self, track: Option<&TrackInfo>) -> bool {
        let Some(track) = track else {
            self.diag.debug(format_args!("No current track; keeping display"));
            return false;
        };
        let text = render(&self.template, track);
        if self.last_text.as_deref() == Some(text.as_str()) {
            return false;
        }
        if self.push(&text) {
            self.last_text = Some(text);
            true
        } else {
            false
        }
    }

    fn push(&mut self, text: &str) -> bool {
        for shape in CallShape::ALL {
            match self.sink.update_text(shape, &self.source_name, text) {
                Ok(()) => {
                    self.diag.debug(format_args!(
                        "Updated text source {:?} via {shape}: {text}",
                        self.source_name
                    ));
                    return true;
                }
                Err(e) => self.diag.warn(format_args!("{shape} failed: {e}")),
            }
        }
        self.diag.error(format_args!(
            "Could not update text source {:?}; all call shapes failed",
            self.source_name
        ));
        false
    }
}
