//! Remote metadata probes: HEAD size checks and small-document GETs.
//!
//! Collects response headers the way libcurl hands them out (one line per
//! callback, all hops when redirects are followed) and keeps the last
//! `Content-Length` seen so redirect chains report the final response.

use std::str;
use std::time::Duration;

use crate::transfer::TransferError;

/// HEAD `url` and return its declared `Content-Length`, or `Ok(None)` when
/// the server does not declare one. `Accept-Encoding: identity` keeps the
/// declared size equal to the raw byte count on disk.
pub fn remote_file_size(url: &str, timeout: Duration) -> Result<Option<u64>, TransferError> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.nobody(true)?; // HEAD request
    easy.follow_location(true)?;
    easy.connect_timeout(timeout)?;
    easy.timeout(timeout)?;

    let mut list = curl::easy::List::new();
    list.append("Accept-Encoding: identity")?;
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }

    check_status(easy.response_code()?)?;
    Ok(parse_content_length(&headers))
}

/// GET a small document (model manifest, directory listing) into memory.
pub fn fetch_string(url: &str, timeout: Duration) -> Result<String, TransferError> {
    const MAX_DOC_BYTES: usize = 4 * 1024 * 1024;

    let mut body: Vec<u8> = Vec::new();
    let mut oversized = false;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(timeout)?;
    easy.timeout(timeout)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            if body.len() + data.len() > MAX_DOC_BYTES {
                oversized = true;
                return Ok(0);
            }
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()
    };

    if oversized {
        return Err(TransferError::Request(format!(
            "document at {} exceeds {} bytes",
            url, MAX_DOC_BYTES
        )));
    }
    perform_result?;

    check_status(easy.response_code()?)?;
    String::from_utf8(body).map_err(|_| TransferError::Request("response is not UTF-8".to_string()))
}

fn check_status(code: u32) -> Result<(), TransferError> {
    if code == 404 {
        return Err(TransferError::NotFound);
    }
    if !(200..300).contains(&code) {
        return Err(TransferError::Server(code));
    }
    Ok(())
}

/// Last `Content-Length` across all response hops (redirects included).
fn parse_content_length(lines: &[String]) -> Option<u64> {
    let mut length = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.trim().parse::<u64>() {
                    length = Some(n);
                }
            }
        }
    }
    length
}
