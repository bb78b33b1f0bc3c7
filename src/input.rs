use camino::Utf8PathBuf;
use serde_json::Value;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};

use crate::filter::GeoipFilter;
use crate::lookup::GeoLookup;
use crate::resolve::Record;

/// A source that can be either a file or stdin.
#[derive(Default, Clone, Debug)]
pub enum FileOrStdin {
    /// Input from a file.
    File(Utf8PathBuf),
    /// Input from stdin.
    #[default]
    Stdin,
}

impl fmt::Display for FileOrStdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOrStdin::File(path) => write!(f, "{}", path),
            FileOrStdin::Stdin => write!(f, "<stdin>"),
        }
    }
}

impl FileOrStdin {
    /// Create a new FileOrStdin from a path.
    ///
    /// If the path is "-", stdin is used.
    pub fn from_path(path: Utf8PathBuf) -> Self {
        if path.as_str() == "-" {
            FileOrStdin::Stdin
        } else {
            FileOrStdin::File(path)
        }
    }

    /// Open the input source as a reader.
    pub fn reader(&self) -> io::Result<InputReader> {
        match self {
            FileOrStdin::File(path) => Ok(InputReader::File(File::open(path)?)),
            FileOrStdin::Stdin => Ok(InputReader::Stdin(io::stdin())),
        }
    }
}

/// A reader for input from either a file or stdin.
pub enum InputReader {
    File(File),
    Stdin(io::Stdin),
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputReader::File(rdr) => rdr.read(buf),
            InputReader::Stdin(rdr) => rdr.read(buf),
        }
    }
}

/// One line of newline-delimited JSON input.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A bare record object, tagged by the caller.
    Record(Record),
    /// A `[tag, time, record]` triple.
    Tagged {
        tag: String,
        time: Value,
        record: Record,
    },
}

impl Event {
    /// Parse a line. Returns `None` for anything but an object or a
    /// `[tag, time, record]` array.
    pub fn parse(line: &[u8]) -> Option<Event> {
        match serde_json::from_slice(line).ok()? {
            Value::Object(record) => Some(Event::Record(record)),
            Value::Array(items) => {
                let [tag, time, record]: [Value; 3] = items.try_into().ok()?;
                match (tag, record) {
                    (Value::String(tag), Value::Object(record)) => {
                        Some(Event::Tagged { tag, time, record })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Enrich the record. Tagged events are emitted under their rewritten
    /// tag; bare records are filtered as if tagged with `default_tag`.
    pub fn process<L: GeoLookup>(self, filter: &GeoipFilter<L>, default_tag: &str) -> Event {
        match self {
            Event::Record(record) => Event::Record(filter.filter(default_tag, record)),
            Event::Tagged { tag, time, record } => {
                let (tag, record) = filter.emit(&tag, record);
                Event::Tagged { tag, time, record }
            }
        }
    }

    /// Write as one line of JSON, including the newline.
    pub fn write_json<W: Write + ?Sized>(&self, wtr: &mut W) -> io::Result<()> {
        match self {
            Event::Record(record) => serde_json::to_writer(&mut *wtr, record)?,
            Event::Tagged { tag, time, record } => {
                serde_json::to_writer(&mut *wtr, &(tag, time, record))?
            }
        }
        wtr.write_all(b"\n")
    }
}

/// What [`process_line`] did with a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// The line held a record, which was enriched and written.
    Enriched,
    /// The line was empty or whitespace and was copied.
    Blank,
    /// The line was not a record and was copied unchanged.
    PassedThrough,
}

/// Enrich one line of input and write the result, always ending with a
/// newline.
///
/// `line` may carry its terminator. Lines that are not records are copied;
/// a missing final newline is added so the next output line stays separate.
pub fn process_line<L: GeoLookup, W: Write + ?Sized>(
    line: &[u8],
    filter: &GeoipFilter<L>,
    default_tag: &str,
    wtr: &mut W,
) -> io::Result<LineOutcome> {
    let content = line.strip_suffix(b"\n").unwrap_or(line);
    let content = content.strip_suffix(b"\r").unwrap_or(content);

    let outcome = if content.iter().all(u8::is_ascii_whitespace) {
        LineOutcome::Blank
    } else if let Some(event) = Event::parse(content) {
        event.process(filter, default_tag).write_json(wtr)?;
        return Ok(LineOutcome::Enriched);
    } else {
        LineOutcome::PassedThrough
    };

    wtr.write_all(line)?;
    if !line.ends_with(b"\n") {
        wtr.write_all(b"\n")?;
    }
    Ok(outcome)
}
