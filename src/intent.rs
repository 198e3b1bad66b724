use std::collections::HashMap;

use thiserror::Error;
use url::Url;

/// Failures recognised while parsing an inbound intent URI.
///
/// These are returned to the caller rather than logged; presentation layers
/// decide how to surface them.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("input is not an absolute URI")]
    NotAUri,
    #[error("URI has no authority component")]
    MissingAuthority,
    #[error("malformed percent-encoding in query string")]
    InvalidPercentEncoding,
}

/// Canonical representation of an inbound intent URI: the authority token the
/// registry is keyed by, plus the decoded query fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentUri {
    domain: String,
    fields: HashMap<String, String>,
}

impl IntentUri {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Parse a raw intent URI into its `(domain, fields)` form.
///
/// The parser is scheme-agnostic: any absolute URI with an authority is
/// accepted. The domain token is the host (with port, if any) followed by the
/// verbatim path, so registry keys may span both, e.g.
/// `webapi.magicpin.in/oms_partner/ondc`. Query fields use standard
/// form-urlencoded semantics: a bare key maps to the empty string, and the
/// last occurrence of a repeated key wins.
pub fn parse(raw: &str) -> Result<IntentUri, ParseError> {
    let url = Url::parse(raw.trim()).map_err(|_| ParseError::NotAUri)?;
    let host = url.host_str().ok_or(ParseError::MissingAuthority)?;

    if let Some(query) = url.query() {
        validate_percent_escapes(query)?;
    }

    let mut domain = host.to_string();
    if let Some(port) = url.port() {
        domain.push(':');
        domain.push_str(&port.to_string());
    }
    domain.push_str(url.path());

    let mut fields = HashMap::new();
    for (key, value) in url.query_pairs() {
        fields.insert(key.into_owned(), value.into_owned());
    }

    Ok(IntentUri { domain, fields })
}

// The url crate decodes broken escapes leniently; the contract here is to
// reject them instead of handing partially-decoded fields downstream.
fn validate_percent_escapes(query: &str) -> Result<(), ParseError> {
    let bytes = query.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let valid = index + 2 < bytes.len()
                && bytes[index + 1].is_ascii_hexdigit()
                && bytes[index + 2].is_ascii_hexdigit();
            if !valid {
                return Err(ParseError::InvalidPercentEncoding);
            }
            index += 3;
        } else {
            index += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_domain_across_host_and_path() {
        let intent = parse(
            "beckn://webapi.magicpin.in/oms_partner/ondc?context.bpp_id=bpp1&context.action=search",
        )
        .expect("parse ok");
        assert_eq!(intent.domain(), "webapi.magicpin.in/oms_partner/ondc");
        assert_eq!(intent.field("context.bpp_id"), Some("bpp1"));
        assert_eq!(intent.field("context.action"), Some("search"));
    }

    #[test]
    fn parse_round_trips_encoded_fields() {
        let mut expected = HashMap::new();
        expected.insert("q".to_string(), "hello world".to_string());
        expected.insert("note".to_string(), "a&b=c".to_string());

        let raw = format!(
            "intent://shop.example?{}",
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("q", "hello world")
                .append_pair("note", "a&b=c")
                .finish()
        );
        let intent = parse(&raw).expect("parse ok");
        assert_eq!(intent.domain(), "shop.example");
        assert_eq!(intent.fields(), &expected);
    }

    #[test]
    fn parse_keeps_last_value_for_repeated_keys() {
        let intent = parse("beckn://shop.example?k=first&k=second").expect("parse ok");
        assert_eq!(intent.field("k"), Some("second"));
        assert_eq!(intent.fields().len(), 1);
    }

    #[test]
    fn parse_maps_bare_key_to_empty_value() {
        let intent = parse("beckn://shop.example?flag&k=v").expect("parse ok");
        assert_eq!(intent.field("flag"), Some(""));
        assert_eq!(intent.field("k"), Some("v"));
    }

    #[test]
    fn parse_preserves_port_and_trailing_slash() {
        let intent = parse("beckn://shop.example:8080/catalog/?k=v").expect("parse ok");
        assert_eq!(intent.domain(), "shop.example:8080/catalog/");
    }

    #[test]
    fn parse_rejects_non_uri_input() {
        assert_eq!(parse("not a uri"), Err(ParseError::NotAUri));
    }

    #[test]
    fn parse_rejects_missing_authority() {
        assert_eq!(parse("mailto:user@example.com"), Err(ParseError::MissingAuthority));
    }

    #[test]
    fn parse_rejects_truncated_percent_escape() {
        assert_eq!(
            parse("beckn://shop.example?k=%2"),
            Err(ParseError::InvalidPercentEncoding)
        );
        assert_eq!(
            parse("beckn://shop.example?k=%zz"),
            Err(ParseError::InvalidPercentEncoding)
        );
    }

    #[test]
    fn parse_accepts_foreign_schemes() {
        let intent = parse("https://shop.example/offers?sku=9").expect("parse ok");
        assert_eq!(intent.domain(), "shop.example/offers");
        assert_eq!(intent.field("sku"), Some("9"));
    }
}
