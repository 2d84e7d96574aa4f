//! Post-download payload checks

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::Result;

/// Files at least this large are taken as media without sniffing.
pub const SUSPICIOUS_SIZE: u64 = 100 * 1024;

/// How many leading bytes are sniffed.
const SNIFF_LEN: usize = 512;

const HTML_SIGNATURES: [&[u8]; 4] = [b"<!doctype html", b"<html", b"<head", b"<body"];

/// `true` if the leading bytes look like an HTML document.
pub fn has_html_signature(head: &[u8]) -> bool {
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    // Skip a UTF-8 BOM.
    let head = head[start..].strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&head[start..]);

    HTML_SIGNATURES.iter().any(|sig| {
        head.len() >= sig.len() && head[..sig.len()].eq_ignore_ascii_case(sig)
    })
}

/// `true` if a downloaded file of `size` bytes is really an error page.
///
/// Only small files are sniffed; a short but genuine clip passes.
pub async fn looks_like_error_page(path: &Path, size: u64) -> Result<bool> {
    if size >= SUSPICIOUS_SIZE {
        return Ok(false);
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut head = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);

    Ok(has_html_signature(&head))
}
