// URL list file: `index,url` header, then one 1-based row per URL

use crate::error::{FetchError, Result};
use std::fs;
use std::path::Path;

pub const CSV_HEADER: &str = "index,url";

pub fn render_url_csv(urls: &[String]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + urls.len() * 96);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for (index, url) in urls.iter().enumerate() {
        out.push_str(&format!("{},{}\n", index + 1, url));
    }
    out
}

pub fn write_url_csv(path: &Path, urls: &[String]) -> Result<()> {
    fs::write(path, render_url_csv(urls)).map_err(|source| FetchError::Output {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a URL list. Rows must be numbered 1..N in order; the URL is
/// everything after the first comma.
pub fn parse_url_csv(content: &str) -> Result<Vec<String>> {
    let mut lines = content.lines().enumerate();

    match lines.next() {
        Some((_, header)) if header.trim_end() == CSV_HEADER => {}
        Some((_, header)) => {
            return Err(FetchError::MalformedUrlList {
                line: 1,
                reason: format!("expected header '{}', found '{}'", CSV_HEADER, header),
            });
        }
        None => return Ok(Vec::new()),
    }

    let mut urls = Vec::new();
    for (index, line) in lines {
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        let (ordinal, url) = line.split_once(',').ok_or_else(|| FetchError::MalformedUrlList {
            line: line_no,
            reason: "missing ',' separator".to_string(),
        })?;
        let ordinal: usize = ordinal.trim().parse().map_err(|_| FetchError::MalformedUrlList {
            line: line_no,
            reason: format!("invalid index '{}'", ordinal),
        })?;
        if ordinal != urls.len() + 1 {
            return Err(FetchError::MalformedUrlList {
                line: line_no,
                reason: format!("expected index {}, found {}", urls.len() + 1, ordinal),
            });
        }
        urls.push(url.to_string());
    }

    Ok(urls)
}

pub fn read_url_csv(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| FetchError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    parse_url_csv(&content)
}
