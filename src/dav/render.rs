//! HTML directory pages and WebDAV multistatus bodies.
//!
//! Every user-controlled string (names, hrefs, paths) is escaped before
//! landing in markup: HTML through [`escape`], XML through `BytesText`.

use crate::dav::listing::ListingEntry;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use quick_xml::{
    Writer,
    escape::escape,
    events::{BytesDecl, BytesText, Event},
};
use std::io::{self, Write};

const DAV_NAMESPACE: &str = "DAV:";

/// `IMF-fixdate`, as used by `Last-Modified` and `getlastmodified`.
pub fn http_date(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Directory page for `title`. `parent_href` is rendered first when present.
pub fn render_directory(title: &str, parent_href: Option<&str>, entries: &[ListingEntry]) -> String {
    let title = escape(title);
    let mut html = format!(
        concat!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">",
            "<title>Index of {0}</title></head>\n<body>\n<h1>Index of {0}</h1>\n",
            "<table>\n<tr><th>Name</th><th>Size</th><th>Last modified</th></tr>\n"
        ),
        title
    );

    if let Some(parent) = parent_href {
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">../</a></td><td></td><td></td></tr>\n",
            escape(parent)
        ));
    }

    for entry in entries {
        let (label, size) = if entry.is_collection {
            (format!("{}/", entry.name), String::from("-"))
        } else {
            (entry.name.clone(), entry.size.to_string())
        };
        let modified = entry
            .last_modified
            .as_ref()
            .map(http_date)
            .unwrap_or_default();
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>\n",
            escape(&entry.href),
            escape(&label),
            size,
            modified
        ));
    }

    html.push_str("</table>\n</body></html>\n");
    html
}

/// PROPFIND response: one `<D:response>` per entry, the requested resource
/// first. Well-formed even for an empty slice.
pub fn render_multistatus(entries: &[ListingEntry]) -> String {
    finish("multistatus", |writer| {
        write_multistatus(writer, |w| {
            for entry in entries {
                write_entry(w, entry)?;
            }
            Ok(())
        })
    })
}

/// Per-member outcome of a multi-object DELETE/COPY/MOVE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberStatus {
    pub href: String,
    pub status: StatusCode,
    pub description: Option<String>,
}

/// Multistatus body listing per-member statuses (no properties).
pub fn render_status_multistatus(members: &[MemberStatus]) -> String {
    finish("status multistatus", |writer| {
        write_multistatus(writer, |w| {
            for member in members {
                w.create_element("D:response").write_inner_content(|w| {
                    write_text(w, "D:href", &member.href)?;
                    write_text(w, "D:status", &status_line(member.status))?;
                    if let Some(description) = &member.description {
                        write_text(w, "D:responsedescription", description)?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })
    })
}

/// Diagnostic page for an error response.
pub fn render_error(title: &str, detail: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{0}</title></head>\n",
            "<body>\n<h1>{0}</h1>\n<p>{1}</p>\n</body></html>\n"
        ),
        escape(title),
        escape(detail)
    )
}

/// RFC 4918 `DAV:propfind-finite-depth` precondition body.
pub fn render_finite_depth_error() -> String {
    finish("finite-depth error", |writer| {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer
            .create_element("D:error")
            .with_attribute(("xmlns:D", DAV_NAMESPACE))
            .write_inner_content(|w| {
                w.create_element("D:propfind-finite-depth").write_empty()?;
                Ok(())
            })?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// XML helpers
// ---------------------------------------------------------------------------

/// Run `write` against an in-memory writer. Writing to a `Vec<u8>` only fails
/// on a logic error, which is logged and yields an empty body.
fn finish<F>(what: &str, write: F) -> String
where
    F: FnOnce(&mut Writer<&mut Vec<u8>>) -> io::Result<()>,
{
    let mut buf = Vec::with_capacity(1024);
    let written = write(&mut Writer::new(&mut buf));
    if let Err(e) = written {
        tracing::error!(error = %e, what, "failed to serialize XML body");
        buf.clear();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Declaration plus the `D:multistatus` root, with `body` as its content.
fn write_multistatus<W, F>(writer: &mut Writer<W>, body: F) -> io::Result<()>
where
    W: Write,
    F: FnOnce(&mut Writer<W>) -> io::Result<()>,
{
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer
        .create_element("D:multistatus")
        .with_attribute(("xmlns:D", DAV_NAMESPACE))
        .write_inner_content(body)?;
    Ok(())
}

fn write_entry<W: Write>(writer: &mut Writer<W>, entry: &ListingEntry) -> io::Result<()> {
    writer.create_element("D:response").write_inner_content(|w| {
        write_text(w, "D:href", &entry.href)?;
        w.create_element("D:propstat").write_inner_content(|w| {
            w.create_element("D:prop").write_inner_content(|w| {
                write_text(w, "D:displayname", &entry.name)?;
                if entry.is_collection {
                    w.create_element("D:resourcetype").write_inner_content(|w| {
                        w.create_element("D:collection").write_empty()?;
                        Ok(())
                    })?;
                } else {
                    w.create_element("D:resourcetype").write_empty()?;
                    write_text(w, "D:getcontentlength", &entry.size.to_string())?;
                    write_text(
                        w,
                        "D:getcontenttype",
                        entry
                            .content_type
                            .as_deref()
                            .unwrap_or("application/octet-stream"),
                    )?;
                }
                if let Some(modified) = &entry.last_modified {
                    write_text(w, "D:getlastmodified", &http_date(modified))?;
                }
                if let Some(etag) = &entry.etag {
                    write_text(w, "D:getetag", &format!("\"{etag}\""))?;
                }
                Ok(())
            })?;
            write_text(w, "D:status", &status_line(StatusCode::OK))?;
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}

/// Write a simple `<tag>text</tag>` element; `text` is escaped.
fn write_text<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
}
