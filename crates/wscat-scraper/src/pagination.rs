//! Cursor pagination via the `Link` response header.
//!
//! The supplier storefront advertises adjacent pages in a `Link` header, with
//! the cursor carried as a `page_info` query parameter:
//!
//! ```text
//! <https://supplier.example.com/products.json?limit=250&page_info=PREV>; rel="previous",
//! <https://supplier.example.com/products.json?limit=250&page_info=NEXT>; rel="next"
//! ```

/// Returns the `page_info` cursor of the `rel="next"` link, if any.
///
/// `None` means the last page was reached: no header, no `next` relation, or
/// a `next` URL without a cursor.
#[must_use]
pub fn extract_next_cursor(link_header: Option<&str>) -> Option<String> {
    link_header?
        .split(',')
        .map(str::trim)
        .find(|directive| is_next_relation(directive))
        .and_then(target_url)
        .and_then(|url| query_value(url, "page_info"))
}

fn is_next_relation(directive: &str) -> bool {
    directive
        .split(';')
        .skip(1)
        .map(str::trim)
        .any(|param| param.eq_ignore_ascii_case(r#"rel="next""#) || param == "rel=next")
}

fn target_url(directive: &str) -> Option<&str> {
    let open = directive.find('<')?;
    let close = directive[open..].find('>')? + open;
    let url = &directive[open + 1..close];
    (!url.is_empty()).then_some(url)
}

// Cursors are base64url and never need percent-decoding.
fn query_value(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, v)| *k == key && !v.is_empty())
        .map(|(_, v)| v.to_owned())
}
