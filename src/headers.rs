//! Part header block parsing.
//!
//! The grammar is deliberately relaxed: `field-name *WSP ":" *WSP value
//! *WSP (CR? LF)`. Names are lowercased for storage and repeats append in
//! wire order. `Content-Disposition` parameters are promoted onto the
//! part record; `filename*` always overrides `filename`, regardless of
//! the order the two appear in. RFC 822 continuation lines are not
//! recognized.

use crate::error::FormError;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PartHeaders {
    /// Lowercased header name to the values seen for it, in wire order.
    pub map: HashMap<String, Vec<String>>,
    params: HashMap<String, String>,
}

impl PartHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one header line (line break already stripped).
    pub fn push_line(&mut self, line: &[u8]) -> Result<(), FormError> {
        let text = String::from_utf8_lossy(line);

        let Some((raw_name, raw_value)) = text.split_once(':') else {
            return Err(FormError::invalid_header(text));
        };

        let name = raw_name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(FormError::invalid_header(text));
        }

        let name = name.to_lowercase();
        let value = raw_value.trim().to_string();

        if name == "content-disposition" {
            self.scan_disposition_params(&value);
        }

        self.map.entry(name).or_default().push(value);
        Ok(())
    }

    /// Pull `key=value` pairs out of a Content-Disposition value.
    ///
    /// Permissive on purpose: values may be quoted or bare, and anything
    /// without an `=` (the `form-data` token itself) is skipped.
    fn scan_disposition_params(&mut self, value: &str) {
        for segment in value.split(';') {
            let segment = segment.trim();
            let Some((key, val)) = segment.split_once('=') else {
                continue;
            };

            let key = key.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }

            let mut val = val.trim();
            if val.len() >= 2 && val.starts_with('"') && val.ends_with('"') {
                val = &val[1..val.len() - 1];
            } else {
                val = val.trim_start_matches('"');
            }

            self.params.insert(key, val.to_string());
        }
    }

    /// The `name` parameter. Its absence is fatal for a form part.
    pub fn name(&self) -> Result<String, FormError> {
        self.params
            .get("name")
            .cloned()
            .ok_or(FormError::MissingName)
    }

    /// The `filename` parameter, with `filename*` taking precedence.
    pub fn filename(&self) -> Option<String> {
        self.params
            .get("filename*")
            .or_else(|| self.params.get("filename"))
            .cloned()
    }
}

/// True when the line consists only of optional whitespace, i.e. the
/// blank line terminating a header block.
pub fn is_blank_line(line: &[u8]) -> bool {
    line.iter().all(|&b| b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> PartHeaders {
        let mut headers = PartHeaders::new();
        for line in lines {
            headers.push_line(line.as_bytes()).unwrap();
        }
        headers
    }

    #[test]
    fn test_simple_form_field() {
        let headers = parse(&[r#"Content-Disposition: form-data; name="field1""#]);
        assert_eq!(headers.name().unwrap(), "field1");
        assert_eq!(headers.filename(), None);
    }

    #[test]
    fn test_file_upload_disposition() {
        let headers = parse(&[r#"Content-Disposition: form-data; name="file"; filename="test.txt""#]);
        assert_eq!(headers.name().unwrap(), "file");
        assert_eq!(headers.filename(), Some("test.txt".to_string()));
    }

    #[test]
    fn test_names_are_lowercased_and_repeats_append() {
        let headers = parse(&[
            "X-Custom: one",
            "x-custom: two",
            "Content-Type: text/plain",
        ]);
        assert_eq!(
            headers.map.get("x-custom").map(Vec::as_slice),
            Some(&["one".to_string(), "two".to_string()][..])
        );
        assert_eq!(
            headers.map.get("content-type").map(Vec::as_slice),
            Some(&["text/plain".to_string()][..])
        );
        for key in headers.map.keys() {
            assert_eq!(key, &key.to_lowercase());
        }
    }

    #[test]
    fn test_relaxed_whitespace_around_colon() {
        let headers = parse(&["Content-Type  :   text/plain   "]);
        assert_eq!(
            headers.map.get("content-type").map(Vec::as_slice),
            Some(&["text/plain".to_string()][..])
        );
    }

    #[test]
    fn test_invalid_header_line() {
        let mut headers = PartHeaders::new();

        let err = headers.push_line(b"no colon here").unwrap_err();
        assert!(matches!(err, FormError::InvalidHeader(_)));

        let err = headers.push_line(b": empty name").unwrap_err();
        assert!(matches!(err, FormError::InvalidHeader(_)));

        let err = headers.push_line(b"bad name: value").unwrap_err();
        assert!(matches!(err, FormError::InvalidHeader(_)));
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let headers = parse(&["Content-Disposition: form-data"]);
        assert!(matches!(headers.name(), Err(FormError::MissingName)));
    }

    #[test]
    fn test_filename_star_overrides_filename() {
        // filename* wins regardless of parameter order
        let first = parse(&[
            r#"Content-Disposition: form-data; name="f"; filename*=encoded.txt; filename="plain.txt""#,
        ]);
        assert_eq!(first.filename(), Some("encoded.txt".to_string()));

        let second = parse(&[
            r#"Content-Disposition: form-data; name="f"; filename="plain.txt"; filename*=encoded.txt"#,
        ]);
        assert_eq!(second.filename(), Some("encoded.txt".to_string()));
    }

    #[test]
    fn test_unquoted_and_oddly_quoted_values() {
        let headers = parse(&[r#"Content-Disposition: form-data; name=bare; filename="half"#]);
        assert_eq!(headers.name().unwrap(), "bare");
        assert_eq!(headers.filename(), Some("half".to_string()));
    }

    #[test]
    fn test_empty_filename_is_preserved() {
        let headers = parse(&[r#"Content-Disposition: form-data; name="f"; filename="""#]);
        assert_eq!(headers.filename(), Some(String::new()));
    }

    #[test]
    fn test_blank_line_detection() {
        assert!(is_blank_line(b""));
        assert!(is_blank_line(b"   \t"));
        assert!(!is_blank_line(b" x "));
    }
}
