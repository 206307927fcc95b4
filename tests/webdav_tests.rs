//! End-to-end WebDAV behavior over HTTP.
//!
//! Covers the verb table (status codes and headers), the collection model
//! as seen by clients, multi-step COPY/MOVE flows and the listing bound.

mod common;

use common::TestServer;
use object_dav::services::dav_service::DavSettings;
use reqwest::StatusCode;

// ============================================================================
// Files and directory pages
// ============================================================================

#[tokio::test]
async fn test_put_then_get_file_and_directory_page() {
    let server = TestServer::start().await;

    server.put_ok("/a/b.txt", "hi").await;

    let (status, body) = server.get_text("/a/b.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hi");

    let (status, html) = server.get_text("/a/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Index of /a/"));
    assert!(html.contains("href=\"/a/b.txt\""));
    let parent = html.find("../").expect("parent link");
    let child = html.find("b.txt").expect("child entry");
    assert!(parent < child, "parent link must come first");
}

#[tokio::test]
async fn test_get_root_lists_top_level_without_parent_link() {
    let server = TestServer::start().await;
    server.put_ok("/docs/readme.md", "# hi").await;
    server.put_ok("/top.txt", "t").await;

    let (status, html) = server.get_text("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("docs/"));
    assert!(html.contains("top.txt"));
    assert!(!html.contains("readme.md"), "grandchildren must be folded");
    assert!(!html.contains("../"));
}

#[tokio::test]
async fn test_get_missing_is_404() {
    let server = TestServer::start().await;
    let (status, _) = server.get_text("/nope.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_preserves_content_type_and_sets_metadata_headers() {
    let server = TestServer::start().await;
    let resp = server
        .request("PUT", "/page.html")
        .header("Content-Type", "text/html")
        .body("<p>x</p>")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().get("etag").is_some());

    let resp = server.head("/page.html").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/html");
    assert_eq!(resp.headers()["content-length"], "8");
    assert!(resp.headers().get("etag").is_some());
    assert!(resp.headers().get("last-modified").is_some());
}

#[tokio::test]
async fn test_put_without_content_type_defaults_to_octet_stream() {
    let server = TestServer::start().await;
    server.put_ok("/blob", vec![0u8, 1, 2]).await;

    let resp = server.get("/blob").await;
    assert_eq!(resp.headers()["content-type"], "application/octet-stream");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &[0u8, 1, 2]);
}

#[tokio::test]
async fn test_head_missing_is_404() {
    let server = TestServer::start().await;
    assert_eq!(server.head("/ghost").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_onto_collection_is_405() {
    let server = TestServer::start().await;
    assert_eq!(server.mkcol("/dir/").await.status(), StatusCode::CREATED);
    assert_eq!(
        server.put("/dir", "x").await.status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[tokio::test]
async fn test_reserved_marker_name_is_forbidden() {
    let server = TestServer::start().await;
    assert_eq!(
        server.put("/dir/_marker", "x").await.status(),
        StatusCode::FORBIDDEN
    );
}

// ============================================================================
// Collections
// ============================================================================

#[tokio::test]
async fn test_mkcol_is_idempotent() {
    let server = TestServer::start().await;
    assert_eq!(server.mkcol("/x/").await.status(), StatusCode::CREATED);
    assert_eq!(server.mkcol("/x/").await.status(), StatusCode::CREATED);

    let (status, body) = server.propfind("/x/", "0").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:collection/>"));
}

#[tokio::test]
async fn test_mkcol_at_root_is_405_with_allow() {
    let server = TestServer::start().await;
    let resp = server.mkcol("/").await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(resp.headers().get("allow").is_some());
}

#[tokio::test]
async fn test_marker_is_hidden_from_listings() {
    let server = TestServer::start().await;
    server.mkcol("/empty/").await;

    let (status, html) = server.get_text("/empty/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!html.contains("_marker"));

    let (_, xml) = server.propfind("/", "infinity").await;
    assert!(xml.contains("<D:href>/empty/</D:href>"));
    assert!(!xml.contains("_marker"));
}

#[tokio::test]
async fn test_head_on_collection_is_html() {
    let server = TestServer::start().await;
    server.mkcol("/c/").await;

    let resp = server.head("/c/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
}

#[tokio::test]
async fn test_implicit_collection_exists_without_marker() {
    let server = TestServer::start().await;
    server.put_ok("/deep/nested/file.txt", "f").await;

    let (status, body) = server.propfind("/deep/", "0").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:href>/deep/</D:href>"));
    assert_eq!(server.head("/deep/nested").await.status(), StatusCode::OK);
}

// ============================================================================
// PROPFIND
// ============================================================================

#[tokio::test]
async fn test_propfind_depth_zero_missing_then_present() {
    let server = TestServer::start().await;

    let (status, _) = server.propfind("/z/", "0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.put_ok("/z/file", "1").await;
    let (status, body) = server.propfind("/z/", "0").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body.matches("<D:response>").count(), 1);
}

#[tokio::test]
async fn test_propfind_depth_one_folds_nested_paths() {
    let server = TestServer::start().await;
    server.put_ok("/p/a.txt", "a").await;
    server.put_ok("/p/sub/b.txt", "b").await;

    let (status, body) = server.propfind("/p/", "1").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:href>/p/</D:href>"));
    assert!(body.contains("<D:href>/p/a.txt</D:href>"));
    assert!(body.contains("<D:href>/p/sub/</D:href>"));
    assert!(!body.contains("b.txt"));
    assert_eq!(body.matches("<D:response>").count(), 3);
}

#[tokio::test]
async fn test_propfind_depth_infinity_lists_descendants() {
    let server = TestServer::start().await;
    server.put_ok("/p/a.txt", "a").await;
    server.put_ok("/p/sub/b.txt", "b").await;

    let (status, body) = server.propfind("/p/", "infinity").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert!(body.contains("<D:href>/p/sub/b.txt</D:href>"));
    assert!(body.contains("<D:href>/p/sub/</D:href>"));
    assert_eq!(body.matches("<D:response>").count(), 4);
}

#[tokio::test]
async fn test_propfind_on_file_returns_single_entry() {
    let server = TestServer::start().await;
    server.put_ok("/solo.txt", "s").await;

    let (status, body) = server.propfind("/solo.txt", "1").await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body.matches("<D:response>").count(), 1);
    assert!(body.contains("<D:href>/solo.txt</D:href>"));
    assert!(body.contains("<D:resourcetype/>"));
}

#[tokio::test]
async fn test_propfind_invalid_depth_is_400() {
    let server = TestServer::start().await;
    let (status, _) = server.propfind("/", "2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_propfind_escapes_names() {
    let server = TestServer::start().await;
    server.put_ok("/odd/a%26b%20c.txt", "x").await;

    let (_, body) = server.propfind("/odd/", "1").await;
    assert!(body.contains("<D:displayname>a&amp;b c.txt</D:displayname>"));
    assert!(body.contains("<D:href>/odd/a&amp;b%20c.txt</D:href>"));
}

// ============================================================================
// DELETE
// ============================================================================

#[tokio::test]
async fn test_delete_is_idempotent() {
    let server = TestServer::start().await;
    server.put_ok("/gone.txt", "x").await;

    assert_eq!(server.delete("/gone.txt").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.delete("/gone.txt").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.get("/gone.txt").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_collection_removes_members_and_marker() {
    let server = TestServer::start().await;
    server.mkcol("/tree/").await;
    server.mkcol("/tree/inner/").await;
    server.put_ok("/tree/inner/leaf.txt", "l").await;
    server.put_ok("/tree/top.txt", "t").await;

    assert_eq!(server.delete("/tree/").await.status(), StatusCode::NO_CONTENT);

    let (status, _) = server.propfind("/tree/", "0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(server.get("/tree/top.txt").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_root_is_405() {
    let server = TestServer::start().await;
    assert_eq!(
        server.delete("/").await.status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}

// ============================================================================
// COPY / MOVE
// ============================================================================

#[tokio::test]
async fn test_copy_delete_move_sequence() {
    let server = TestServer::start().await;
    server.put_ok("/a/b.txt", "original").await;

    assert_eq!(server.copy("/a/b.txt", "/a/c.txt").await.status(), StatusCode::CREATED);
    assert_eq!(server.delete("/a/b.txt").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        server.move_("/a/c.txt", "/a/d.txt").await.status(),
        StatusCode::NO_CONTENT
    );

    assert_eq!(server.get("/a/b.txt").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.get("/a/c.txt").await.status(), StatusCode::NOT_FOUND);
    let (status, body) = server.get_text("/a/d.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "original");

    let (_, xml) = server.propfind("/a/", "1").await;
    assert_eq!(xml.matches("<D:response>").count(), 2);
}

#[tokio::test]
async fn test_copy_preserves_content_type_and_source() {
    let server = TestServer::start().await;
    let resp = server
        .request("PUT", "/src.json")
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    assert_eq!(server.copy("/src.json", "/dst.json").await.status(), StatusCode::CREATED);

    let copied = server.get("/dst.json").await;
    assert_eq!(copied.headers()["content-type"], "application/json");
    assert_eq!(server.get_text("/src.json").await, (StatusCode::OK, "{}".into()));
}

#[tokio::test]
async fn test_copy_missing_destination_is_400() {
    let server = TestServer::start().await;
    server.put_ok("/f", "x").await;

    let resp = server.request("COPY", "/f").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_copy_missing_source_is_404() {
    let server = TestServer::start().await;
    assert_eq!(server.copy("/absent", "/x").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_copy_without_overwrite_onto_existing_is_412() {
    let server = TestServer::start().await;
    server.put_ok("/one", "1").await;
    server.put_ok("/two", "2").await;

    let resp = server
        .request("COPY", "/one")
        .header("Destination", "/two")
        .header("Overwrite", "F")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(server.get_text("/two").await.1, "2");
}

#[tokio::test]
async fn test_move_collection_moves_every_member() {
    let server = TestServer::start().await;
    server.mkcol("/old/").await;
    server.put_ok("/old/a.txt", "a").await;
    server.put_ok("/old/sub/b.txt", "b").await;

    assert_eq!(server.move_("/old/", "/new/").await.status(), StatusCode::NO_CONTENT);

    let (status, _) = server.propfind("/old/", "0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(server.get_text("/new/a.txt").await.1, "a");
    assert_eq!(server.get_text("/new/sub/b.txt").await.1, "b");

    let (_, xml) = server.propfind("/new/", "0").await;
    assert!(xml.contains("<D:collection/>"));
}

#[tokio::test]
async fn test_move_with_depth_zero_is_400() {
    let server = TestServer::start().await;
    server.put_ok("/m", "x").await;

    let resp = server
        .request("MOVE", "/m")
        .header("Destination", "/n")
        .header("Depth", "0")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.get_text("/m").await.1, "x");
}

#[tokio::test]
async fn test_move_onto_ancestor_is_forbidden() {
    let server = TestServer::start().await;
    server.put_ok("/a/b.txt", "b").await;
    server.put_ok("/a/other.txt", "o").await;

    let resp = server
        .request("MOVE", "/a/b.txt")
        .header("Destination", "/a")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.get_text("/a/b.txt").await.1, "b");
    assert_eq!(server.get_text("/a/other.txt").await.1, "o");
}

#[tokio::test]
async fn test_copy_onto_itself_is_forbidden() {
    let server = TestServer::start().await;
    server.put_ok("/same.txt", "x").await;
    assert_eq!(
        server.copy("/same.txt", "/same.txt").await.status(),
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_copy_with_depth_one_is_400() {
    let server = TestServer::start().await;
    server.put_ok("/dir/f", "x").await;

    let resp = server
        .request("COPY", "/dir/")
        .header("Destination", "/copy/")
        .header("Depth", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_overwrite_header_is_400() {
    let server = TestServer::start().await;
    server.put_ok("/one", "1").await;

    let resp = server
        .request("COPY", "/one")
        .header("Destination", "/two")
        .header("Overwrite", "maybe")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.get("/two").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_overwrite_replaces_existing_collection() {
    let server = TestServer::start().await;
    server.mkcol("/dst/").await;
    server.put_ok("/dst/stale.txt", "stale").await;
    server.put_ok("/src/fresh.txt", "fresh").await;

    assert_eq!(server.copy("/src/", "/dst/").await.status(), StatusCode::CREATED);

    assert_eq!(server.get("/dst/stale.txt").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.get_text("/dst/fresh.txt").await.1, "fresh");
}

#[tokio::test]
async fn test_copy_collection_over_file_hides_nothing() {
    let server = TestServer::start().await;
    server.put_ok("/target", "old file").await;
    server.put_ok("/tree/f", "new").await;

    assert_eq!(server.copy("/tree/", "/target").await.status(), StatusCode::CREATED);
    assert_eq!(server.delete("/target/f").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.get("/target").await.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// OPTIONS, unsupported methods, health
// ============================================================================

#[tokio::test]
async fn test_options_advertises_capabilities() {
    let server = TestServer::start().await;
    let resp = server.request("OPTIONS", "/").send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["dav"], "1, 2");
    assert_eq!(resp.headers()["ms-author-via"], "DAV");
    let allow = resp.headers()["allow"].to_str().unwrap();
    for method in ["PROPFIND", "MKCOL", "COPY", "MOVE"] {
        assert!(allow.contains(method), "Allow lacks {method}");
    }
}

#[tokio::test]
async fn test_unsupported_method_is_405() {
    let server = TestServer::start().await;
    let resp = server.request("PATCH", "/file").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(resp.headers().get("allow").is_some());
}

#[tokio::test]
async fn test_health_endpoints() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/healthz", server.origin))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/readyz", server.origin))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bucket"], "webdav");
    for check in ["sqlite", "bucket", "disk"] {
        assert_eq!(body["checks"][check]["ok"], true, "{check} failed");
    }
}

// ============================================================================
// Configuration-dependent behavior
// ============================================================================

#[tokio::test]
async fn test_mount_prefix_scopes_urls() {
    let server = TestServer::with_settings(DavSettings {
        mount_prefix: "/dav".into(),
        ..DavSettings::default()
    })
    .await;

    server.put_ok("/notes.txt", "n").await;

    let (_, xml) = server.propfind("/", "1").await;
    assert!(xml.contains("<D:href>/dav/</D:href>"));
    assert!(xml.contains("<D:href>/dav/notes.txt</D:href>"));

    let outside = reqwest::Client::new()
        .get(format!("{}/notes.txt", server.origin))
        .send()
        .await
        .unwrap();
    assert_eq!(outside.status(), StatusCode::NOT_FOUND);

    assert_eq!(server.move_("/notes.txt", "/moved.txt").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(server.get_text("/moved.txt").await.1, "n");
}

#[tokio::test]
async fn test_oversized_listings_are_refused() {
    let server = TestServer::with_settings(DavSettings {
        max_listing_entries: 2,
        ..DavSettings::default()
    })
    .await;
    for name in ["a", "b", "c"] {
        server.put_ok(&format!("/big/{name}"), "x").await;
    }

    let (status, body) = server.propfind("/", "infinity").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("propfind-finite-depth"));

    let (status, _) = server.propfind("/big/", "1").await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);

    let (status, _) = server.get_text("/big/").await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);
}
