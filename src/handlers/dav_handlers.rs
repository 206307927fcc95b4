//! WebDAV method dispatcher.
//!
//! Every request that is not a health probe lands in [`dispatch`], which maps
//! the verb onto a `DavService` operation and renders its outcome. Object
//! bodies are streamed in both directions.

use crate::{
    dav::{
        listing::Depth,
        path::{self, ResourceKey},
        render,
    },
    errors::{ALLOWED_METHODS, DavError, DavResult},
    services::{
        dav_service::{DavService, GetOutcome, HeadOutcome, MultiOutcome},
        object_store::ObjectInfo,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
};
use futures::StreamExt;
use std::io;
use tracing::debug;

static DAV: HeaderName = HeaderName::from_static("dav");
static DEPTH: HeaderName = HeaderName::from_static("depth");
static DESTINATION: HeaderName = HeaderName::from_static("destination");
static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
static MS_AUTHOR_VIA: HeaderName = HeaderName::from_static("ms-author-via");

const HTML: &str = "text/html; charset=utf-8";
const XML: &str = "application/xml; charset=utf-8";

/// Fallback handler for every WebDAV verb.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, DavError> {
    if method == Method::OPTIONS {
        return Ok(options());
    }

    let dav = &state.dav;
    let key = path::resolve(uri.path(), &dav.settings().mount_prefix)?;
    debug!(%method, %key, "dispatching");

    match method.as_str() {
        "GET" => get(dav, &key).await,
        "HEAD" => head(dav, &key).await,
        "PUT" => put(dav, &key, &headers, body).await,
        "DELETE" => delete(dav, &key).await,
        "MKCOL" => mkcol(dav, &key).await,
        "PROPFIND" => propfind(dav, &key, &headers).await,
        "COPY" => copy(dav, &key, &headers).await,
        "MOVE" => move_(dav, &key, &headers).await,
        other => Err(DavError::MethodNotAllowed(format!(
            "{other} is not supported"
        ))),
    }
}

/// OPTIONS: capabilities. Advertises class 2 although LOCK is not served.
fn options() -> Response {
    let mut response = empty(StatusCode::OK);
    let headers = response.headers_mut();
    headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(DAV.clone(), HeaderValue::from_static("1, 2"));
    headers.insert(MS_AUTHOR_VIA.clone(), HeaderValue::from_static("DAV"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

async fn head(dav: &DavService, key: &ResourceKey) -> DavResult<Response> {
    let mut response = empty(StatusCode::OK);
    match dav.head(key).await? {
        HeadOutcome::Object(info) => set_object_headers(response.headers_mut(), &info),
        HeadOutcome::Collection => {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML));
        }
    }
    Ok(response)
}

async fn get(dav: &DavService, key: &ResourceKey) -> DavResult<Response> {
    match dav.get(key).await? {
        GetOutcome::File(reader) => {
            let mut response = Response::new(Body::from_stream(reader.body));
            set_object_headers(response.headers_mut(), &reader.info);
            Ok(response)
        }
        GetOutcome::Directory {
            title,
            parent_href,
            entries,
        } => {
            let html = render::render_directory(&title, parent_href.as_deref(), &entries);
            Ok(with_body(StatusCode::OK, HTML, html))
        }
    }
}

async fn put(
    dav: &DavService,
    key: &ResourceKey,
    headers: &HeaderMap,
    body: Body,
) -> DavResult<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();

    let info = dav.put(key, stream, content_type).await?;

    let mut response = empty(StatusCode::CREATED);
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", info.etag)) {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

async fn delete(dav: &DavService, key: &ResourceKey) -> DavResult<Response> {
    let outcome = dav.delete(key).await?;
    Ok(multi_response(outcome, StatusCode::NO_CONTENT))
}

async fn mkcol(dav: &DavService, key: &ResourceKey) -> DavResult<Response> {
    dav.mkcol(key).await?;
    Ok(empty(StatusCode::CREATED))
}

async fn propfind(dav: &DavService, key: &ResourceKey, headers: &HeaderMap) -> DavResult<Response> {
    let depth = Depth::parse(header_str(headers, &DEPTH)?)?;
    let entries = dav.propfind(key, depth).await?;
    Ok(with_body(
        StatusCode::MULTI_STATUS,
        XML,
        render::render_multistatus(&entries),
    ))
}

async fn copy(dav: &DavService, src: &ResourceKey, headers: &HeaderMap) -> DavResult<Response> {
    let dst = destination(dav, headers)?;
    let depth = Depth::parse(header_str(headers, &DEPTH)?)?;
    let outcome = dav.copy(src, &dst, depth, overwrite(headers)?).await?;
    Ok(multi_response(outcome, StatusCode::CREATED))
}

async fn move_(dav: &DavService, src: &ResourceKey, headers: &HeaderMap) -> DavResult<Response> {
    let dst = destination(dav, headers)?;
    if Depth::parse(header_str(headers, &DEPTH)?)? != Depth::Infinity {
        return Err(DavError::BadRequest("MOVE requires Depth: infinity".into()));
    }
    let outcome = dav.move_(src, &dst, overwrite(headers)?).await?;
    Ok(multi_response(outcome, StatusCode::NO_CONTENT))
}

/// Resolve the `Destination` header (absolute URL or absolute path) through
/// the same path rules as the request URL.
fn destination(dav: &DavService, headers: &HeaderMap) -> DavResult<ResourceKey> {
    let raw = header_str(headers, &DESTINATION)?
        .ok_or_else(|| DavError::BadRequest("missing Destination header".into()))?;
    let uri: Uri = raw
        .parse()
        .map_err(|_| DavError::BadRequest(format!("unparseable Destination `{raw}`")))?;
    if uri.scheme().is_none() && !raw.starts_with('/') {
        return Err(DavError::BadRequest(format!(
            "Destination `{raw}` is not an absolute URL"
        )));
    }

    path::resolve(uri.path(), &dav.settings().mount_prefix).map_err(|err| {
        DavError::BadRequest(format!("invalid Destination: {err}"))
    })
}

fn overwrite(headers: &HeaderMap) -> DavResult<bool> {
    match header_str(headers, &OVERWRITE)?.map(str::trim) {
        None => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("t") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("f") => Ok(false),
        Some(other) => Err(DavError::BadRequest(format!(
            "invalid Overwrite header `{other}`"
        ))),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> DavResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| DavError::BadRequest(format!("non-ASCII {name} header")))
        })
        .transpose()
}

/// `success` when every member went through, otherwise 207 naming failures.
fn multi_response(outcome: MultiOutcome, success: StatusCode) -> Response {
    if outcome.is_complete() {
        return empty(success);
    }
    with_body(
        StatusCode::MULTI_STATUS,
        XML,
        render::render_status_multistatus(&outcome.failures),
    )
}

fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn with_body(status: StatusCode, content_type: &'static str, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectInfo) {
    let content_type = meta
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&render::http_date(&meta.last_modified)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
