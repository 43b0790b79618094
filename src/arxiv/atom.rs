use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::warn;

use crate::error::TransportError;
use crate::models::RawPaper;

/// One `<entry>` of an arXiv Atom feed, as strings straight off the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRecord {
    pub entry_id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub primary_category: Option<String>,
    pub published: String,
    pub updated: String,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("entry has no id")]
    MissingId,
    #[error("entry {0} has no title")]
    MissingTitle(String),
    #[error("entry {id} has bad {field} timestamp {value:?}")]
    BadTimestamp {
        id: String,
        field: &'static str,
        value: String,
    },
}

impl TryFrom<ResultRecord> for RawPaper {
    type Error = RecordError;

    fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
        let arxiv_id = arxiv_id_from_entry(&record.entry_id).ok_or(RecordError::MissingId)?;
        let title = normalize_ws(&record.title);
        if title.is_empty() {
            return Err(RecordError::MissingTitle(arxiv_id));
        }

        let published = parse_timestamp(&arxiv_id, "published", &record.published)?;
        let updated = if record.updated.trim().is_empty() {
            published
        } else {
            parse_timestamp(&arxiv_id, "updated", &record.updated)?
        };

        let primary_category = record
            .primary_category
            .or_else(|| record.categories.first().cloned())
            .unwrap_or_default();
        let pdf_url = record
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{arxiv_id}"));

        Ok(RawPaper {
            title,
            abstract_text: normalize_ws(&record.summary),
            authors: record.authors,
            categories: record.categories,
            primary_category,
            published,
            updated,
            pdf_url,
            abs_url: record.entry_id.trim().to_string(),
            arxiv_id,
        })
    }
}

fn parse_timestamp(id: &str, field: &'static str, value: &str) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RecordError::BadTimestamp {
            id: id.to_string(),
            field,
            value: value.to_string(),
        })
}

/// `http://arxiv.org/abs/2401.12345v1` -> `2401.12345v1`,
/// `http://arxiv.org/abs/cs/9901001v1` -> `cs/9901001v1`.
pub fn arxiv_id_from_entry(entry_id: &str) -> Option<String> {
    let entry_id = entry_id.trim();
    let id = match entry_id.rfind("/abs/") {
        Some(ix) => &entry_id[ix + "/abs/".len()..],
        None => entry_id.rsplit('/').next().unwrap_or(entry_id),
    };
    let id = id.trim_matches('/').trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn local_name(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|b| *b == b':') {
        Some(ix) => &raw[ix + 1..],
        None => raw,
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

#[derive(Default)]
struct Cursor {
    record: ResultRecord,
    in_entry: bool,
    in_author: bool,
    text: String,
    /// Set when some text in the entry could not be decoded.
    bad_text: Option<String>,
}

impl Cursor {
    fn element(&mut self, e: &BytesStart<'_>) {
        if !self.in_entry {
            return;
        }
        match local_name(e.name().as_ref()) {
            b"category" => {
                if let Some(term) = attr(e, b"term").filter(|t| !t.trim().is_empty()) {
                    self.record.categories.push(term);
                }
            }
            b"primary_category" => {
                self.record.primary_category = attr(e, b"term").filter(|t| !t.trim().is_empty());
            }
            b"link" => {
                let is_pdf = attr(e, b"title").is_some_and(|t| t.eq_ignore_ascii_case("pdf"))
                    || attr(e, b"type").is_some_and(|t| t.contains("pdf"));
                if is_pdf && self.record.pdf_url.is_none() {
                    self.record.pdf_url = attr(e, b"href");
                }
            }
            _ => {}
        }
    }
}

fn text_content(t: &BytesText<'_>) -> Result<String, String> {
    let text = t.unescape().map_err(|e| e.to_string())?;
    Ok(text.into_owned())
}

/// Parse an arXiv Atom response into raw records. Only a feed that is not
/// well-formed XML fails. An entry with undecodable text is dropped with a
/// warning; other odd entries are passed through for per-record conversion
/// to judge.
pub fn parse_feed(xml: &str) -> Result<Vec<ResultRecord>, TransportError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut cur = Cursor::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"entry" => {
                        cur = Cursor {
                            in_entry: true,
                            ..Cursor::default()
                        };
                    }
                    b"author" if cur.in_entry => cur.in_author = true,
                    _ => cur.element(&e),
                }
                cur.text.clear();
            }
            Ok(Event::Empty(e)) => cur.element(&e),
            Ok(Event::Text(t)) => {
                if cur.in_entry {
                    match text_content(&t) {
                        Ok(txt) => cur.text.push_str(&txt),
                        Err(e) => {
                            cur.bad_text.get_or_insert(e);
                        }
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if cur.in_entry {
                    cur.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(e)) if cur.in_entry => {
                let text = std::mem::take(&mut cur.text);
                match local_name(e.name().as_ref()) {
                    b"entry" => {
                        cur.in_entry = false;
                        let record = std::mem::take(&mut cur.record);
                        match cur.bad_text.take() {
                            Some(error) => {
                                warn!(entry = %record.entry_id, %error, "skipping entry with bad text")
                            }
                            None => out.push(record),
                        }
                    }
                    b"author" => cur.in_author = false,
                    b"name" if cur.in_author => {
                        let name = normalize_ws(&text);
                        if !name.is_empty() {
                            cur.record.authors.push(name);
                        }
                    }
                    b"id" => cur.record.entry_id = text.trim().to_string(),
                    b"title" => cur.record.title = text,
                    b"summary" => cur.record.summary = text,
                    b"published" => cur.record.published = text.trim().to_string(),
                    b"updated" => cur.record.updated = text.trim().to_string(),
                    _ => {}
                }
            }
            Err(e) => return Err(TransportError::Other(format!("XML parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
