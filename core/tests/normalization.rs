//! Fetch-style request/response normalization through the public API.
//!
//! # Design
//! Walks a request from `http::Request` to `RequestDescription`, then feeds
//! raw header bytes through the incremental decoder the way the native
//! header callback would, and normalizes the result into a `FetchResponse`.

use impersonate_core::{
    header_lines, to_fetch_response, to_request_description, validate_description, Error,
    FetchBody, FetchOptions, HeaderLineDecoder, Method, RedirectMode, ResponseHead,
    ValidationError,
};

fn decode(chunks: &[&[u8]]) -> Vec<String> {
    let mut decoder = HeaderLineDecoder::new();
    let mut lines = Vec::new();
    for chunk in chunks {
        decoder.feed(chunk, &mut lines);
    }
    decoder.flush(&mut lines);
    lines
}

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

#[test]
fn json_post_keeps_body_and_explicit_content_type() {
    let json = r#"{"query":"rust","page":2}"#;
    let request = http::Request::post("https://api.example.com/search")
        .header("Content-Type", "application/json")
        .body(FetchBody::from(json))
        .unwrap();
    let (desc, redirect) =
        to_request_description(request, &FetchOptions::new("chrome124")).unwrap();

    assert_eq!(desc.method, Method::Post);
    assert_eq!(desc.body.as_deref(), Some(json.as_bytes()));
    assert_eq!(redirect, RedirectMode::Follow);
    assert!(desc.follow_redirects);
    let lines = header_lines(&desc.headers).unwrap();
    assert_eq!(lines, vec!["content-type: application/json"]);
    assert!(validate_description(&desc).is_ok());
}

#[test]
fn form_body_gets_implied_content_type() {
    let request = http::Request::post("https://example.com/login")
        .body(FetchBody::Form(vec![
            ("user".to_string(), "ada lovelace".to_string()),
            ("remember".to_string(), "1".to_string()),
        ]))
        .unwrap();
    let (desc, _) = to_request_description(request, &FetchOptions::new("chrome124")).unwrap();
    assert_eq!(desc.body.as_deref(), Some(&b"user=ada+lovelace&remember=1"[..]));
    let lines = header_lines(&desc.headers).unwrap();
    assert_eq!(
        lines,
        vec!["content-type: application/x-www-form-urlencoded;charset=UTF-8"]
    );
}

#[test]
fn options_from_json_drive_the_description() {
    let options = FetchOptions::from_json(
        r#"{
            "target": "safari17_0",
            "timeoutMs": 2500,
            "redirect": "manual",
            "insecureSkipVerify": true,
            "defaultHeaders": false
        }"#,
    )
    .unwrap();
    let request = http::Request::get("http://example.com/")
        .body(FetchBody::Empty)
        .unwrap();
    let (desc, redirect) = to_request_description(request, &options).unwrap();
    assert_eq!(desc.target, "safari17_0");
    assert_eq!(desc.timeout, Some(std::time::Duration::from_millis(2500)));
    assert_eq!(redirect, RedirectMode::Manual);
    assert!(!desc.follow_redirects);
    assert!(desc.insecure);
    assert!(!desc.default_headers);
}

#[test]
fn non_http_schemes_are_rejected_by_name() {
    for url in ["ftp://example.com/file", "ws://example.com/socket"] {
        let request = http::Request::get(url).body(FetchBody::Empty).unwrap();
        let err = to_request_description(request, &FetchOptions::new("chrome124")).unwrap_err();
        let scheme = url.split(':').next().unwrap();
        assert!(err.to_string().contains(scheme), "{err}");
    }
}

#[test]
fn missing_target_is_rejected() {
    let request = http::Request::get("https://example.com/")
        .body(FetchBody::Empty)
        .unwrap();
    let err = to_request_description(request, &FetchOptions::new("")).unwrap_err();
    assert!(matches!(err, Error::Validation(ValidationError::MissingTarget)));
}

// ---------------------------------------------------------------------------
// Response side
// ---------------------------------------------------------------------------

#[test]
fn decoded_cookie_headers_keep_duplicates() {
    let lines = decode(&[
        b"HTTP/1.1 200 OK\r\nset-cookie: a=1\r",
        b"\nset-cookie: b=2\r\ncontent-type: text/plain\r\n\r\n",
    ]);
    let head = ResponseHead {
        status: 200,
        header_lines: lines,
        effective_url: "https://example.com/".to_string(),
    };
    let response =
        to_fetch_response(head, (), RedirectMode::Follow, "https://example.com/").unwrap();
    let cookies: Vec<_> = response.headers.get_all("set-cookie").iter().collect();
    assert_eq!(cookies, ["a=1", "b=2"]);
    assert_eq!(response.headers.get_all("content-type").iter().count(), 1);
    assert!(!response.redirected);
}

#[test]
fn followed_chain_uses_last_head() {
    let lines = decode(&[
        b"HTTP/1.1 301 Moved Permanently\r\nlocation: https://example.com/new\r\n\r\n",
        b"HTTP/2 200\r\nx-final: yes\r\n\r\n",
    ]);
    let head = ResponseHead {
        status: 200,
        header_lines: lines,
        effective_url: "https://example.com/new".to_string(),
    };
    let response =
        to_fetch_response(head, (), RedirectMode::Follow, "https://example.com/old").unwrap();
    assert!(response.redirected);
    assert_eq!(response.url.as_str(), "https://example.com/new");
    assert!(response.headers.get("location").is_none());
    assert_eq!(response.headers["x-final"], "yes");
    assert_eq!(response.status_text, "OK");
}

#[test]
fn manual_mode_returns_raw_redirect() {
    let head = ResponseHead {
        status: 302,
        header_lines: decode(&[b"HTTP/1.1 302 Found\r\nLocation: /next\r\n\r\n"]),
        effective_url: "https://example.com/start".to_string(),
    };
    let response =
        to_fetch_response(head, (), RedirectMode::Manual, "https://example.com/start").unwrap();
    assert_eq!(response.status, 302);
    assert!(!response.redirected);
    assert!(!response.ok());
    assert_eq!(response.headers["location"], "/next");
}

#[test]
fn error_mode_blocks_redirect_with_location() {
    let head = ResponseHead {
        status: 307,
        header_lines: decode(&[b"HTTP/1.1 307 Temporary Redirect\r\nLocation: /next\r\n\r\n"]),
        effective_url: "https://example.com/start".to_string(),
    };
    let err =
        to_fetch_response(head, (), RedirectMode::Error, "https://example.com/start").unwrap_err();
    assert!(matches!(err, Error::RedirectBlocked { status: 307, .. }));
}
