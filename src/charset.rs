use encoding_rs::Encoding;
use scraper::{Html, Selector};
use tracing::debug;

/// Reads the `charset=` parameter from a `Content-Type` style value.
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\'').to_lowercase())
        .filter(|charset| !charset.is_empty())
}

/// Resolves the document charset.
///
/// Looked up in order: the `Content-Type` header, `<meta charset>`, and
/// `<meta content="text/html; charset=...">`.
pub fn resolve_charset(content_type: &str, document: &Html) -> Option<String> {
    if let Some(charset) = charset_from_content_type(content_type) {
        return Some(charset);
    }

    let meta_charset = Selector::parse("meta[charset]").ok()?;
    if let Some(charset) = document
        .select(&meta_charset)
        .filter_map(|el| el.value().attr("charset"))
        .map(|c| c.trim().to_lowercase())
        .find(|c| !c.is_empty())
    {
        return Some(charset);
    }

    let meta_content = Selector::parse("meta[content]").ok()?;
    document
        .select(&meta_content)
        .filter_map(|el| el.value().attr("content"))
        .filter(|content| content.trim_start().to_lowercase().starts_with("text/html"))
        .find_map(charset_from_content_type)
}

/// Transcodes `bytes` from `charset` into a UTF-8 string. An absent or
/// unrecognized charset leaves the input as is.
pub fn decode(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.and_then(|label| Encoding::for_label(label.trim().as_bytes())) {
        Some(encoding) => {
            let (text, actual, had_errors) = encoding.decode(bytes);
            if had_errors {
                debug!(charset = actual.name(), "Malformed sequences replaced while decoding");
            }
            text.into_owned()
        }
        None => {
            if let Some(label) = charset {
                debug!(charset = %label, "Unknown charset, passing text through");
            }
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_header() {
        let doc = Html::parse_document("<html></html>");
        assert_eq!(
            resolve_charset("text/html; charset=Windows-1251", &doc).as_deref(),
            Some("windows-1251")
        );
        assert_eq!(
            resolve_charset("text/html;charset=\"utf-8\"", &doc).as_deref(),
            Some("utf-8")
        );
        assert_eq!(resolve_charset("text/html", &doc), None);
    }

    #[test]
    fn test_header_wins_over_meta() {
        let doc = Html::parse_document(r#"<html><head><meta charset="koi8-r"></head></html>"#);
        assert_eq!(
            resolve_charset("text/html; charset=utf-8", &doc).as_deref(),
            Some("utf-8")
        );
    }

    #[test]
    fn test_meta_charset() {
        let doc = Html::parse_document(r#"<html><head><meta charset="KOI8-R"></head></html>"#);
        assert_eq!(resolve_charset("text/html", &doc).as_deref(), Some("koi8-r"));
    }

    #[test]
    fn test_meta_http_equiv_content() {
        let doc = Html::parse_document(
            r#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=windows-1251"></head></html>"#,
        );
        assert_eq!(resolve_charset("", &doc).as_deref(), Some("windows-1251"));
    }

    #[test]
    fn test_decode_windows_1251() {
        // "Привет" in windows-1251
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        assert_eq!(decode(&bytes, Some("windows-1251")), "Привет");
    }

    #[test]
    fn test_decode_unknown_charset_passes_through() {
        assert_eq!(decode("Hello".as_bytes(), Some("no-such-charset")), "Hello");
        assert_eq!(decode("Grüße".as_bytes(), None), "Grüße");
    }
}
