//! Error paths: bad requests, policy denials, unreachable upstreams,
//! and the statistics page.

mod common;

use anyhow::Result;
use common::*;
use std::io::Write;

fn status_line_count(response: &str) -> usize {
    response.matches("HTTP/1.0 ").count()
}

#[tokio::test]
async fn short_request_line_gets_400() -> Result<()> {
    let proxy = spawn_proxy(test_config()).await?;
    let response = roundtrip(proxy, b"GARBAGE\r\n\r\n").await?;
    let response = String::from_utf8(response)?;
    assert!(response.starts_with("HTTP/1.0 400 Bad Request\r\n"));
    assert_eq!(status_line_count(&response), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_url_type_gets_400() -> Result<()> {
    let proxy = spawn_proxy(test_config()).await?;
    let response = roundtrip(proxy, b"GET ftp://example.com/ HTTP/1.0\r\n\r\n").await?;
    assert!(response.starts_with(b"HTTP/1.0 400 Bad Request\r\n"));
    Ok(())
}

#[tokio::test]
async fn acl_denial_gets_403() -> Result<()> {
    let mut config = test_config();
    config.acl = vec!["deny 127.0.0.1".to_string()];
    let proxy = spawn_proxy(config).await?;

    let response = roundtrip(proxy, b"GET http://example.com/ HTTP/1.0\r\n\r\n").await?;
    let response = String::from_utf8(response)?;
    assert!(response.starts_with("HTTP/1.0 403 Access denied\r\n"));
    assert_eq!(status_line_count(&response), 1);
    Ok(())
}

#[tokio::test]
async fn filtered_domain_gets_404() -> Result<()> {
    let mut filter_file = tempfile::NamedTempFile::new()?;
    writeln!(filter_file, "# test filter\nblocked.example")?;

    let mut config = test_config();
    config.filter_file = Some(filter_file.path().to_path_buf());
    let proxy = spawn_proxy(config).await?;

    let response = roundtrip(proxy, b"GET http://blocked.example/ HTTP/1.0\r\n\r\n").await?;
    assert!(response.starts_with(b"HTTP/1.0 404 Not Found\r\n"));

    // Subdomains of a filtered domain are refused too.
    let response = roundtrip(proxy, b"GET http://ads.blocked.example/ HTTP/1.0\r\n\r\n").await?;
    assert!(response.starts_with(b"HTTP/1.0 404 Not Found\r\n"));
    Ok(())
}

#[tokio::test]
async fn unreachable_origin_gets_500() -> Result<()> {
    let proxy = spawn_proxy(test_config()).await?;
    // Port 1 on loopback refuses immediately.
    let response = roundtrip(proxy, b"GET http://127.0.0.1:1/ HTTP/1.0\r\n\r\n").await?;
    let response = String::from_utf8(response)?;
    assert!(response.starts_with("HTTP/1.0 500 Unable to connect\r\n"));
    assert_eq!(status_line_count(&response), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_upstream_gets_404() -> Result<()> {
    let mut config = test_config();
    config.upstream = Some("127.0.0.1:1".parse().unwrap());
    let proxy = spawn_proxy(config).await?;

    let response = roundtrip(proxy, b"GET http://example.com/ HTTP/1.0\r\n\r\n").await?;
    assert!(response.starts_with(b"HTTP/1.0 404 Not Found\r\n"));
    Ok(())
}

#[tokio::test]
async fn stat_host_serves_the_statistics_page() -> Result<()> {
    let mut config = test_config();
    config.stat_host = Some("proxy.stats".to_string());
    let proxy = spawn_proxy(config).await?;

    let response = roundtrip(proxy, b"GET http://proxy.stats/ HTTP/1.0\r\n\r\n").await?;
    let response = String::from_utf8(response)?;
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(response.contains("statistics"));
    assert!(response.contains("Open connections"));
    Ok(())
}

#[tokio::test]
async fn denied_request_with_body_still_gets_one_status_line() -> Result<()> {
    let mut config = test_config();
    config.acl = vec!["deny 127.0.0.1".to_string()];
    let proxy = spawn_proxy(config).await?;

    let request = b"POST http://example.com/ HTTP/1.0\r\nContent-Length: 5\r\n\r\nhello";
    let response = roundtrip(proxy, request).await?;
    let response = String::from_utf8(response)?;
    assert!(response.starts_with("HTTP/1.0 403 Access denied\r\n"));
    assert_eq!(status_line_count(&response), 1);
    Ok(())
}
