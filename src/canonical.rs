//! SigV4 canonical request construction.
//!
//! This turns the method, path, query string, and signed headers of a request into the exact byte string that is
//! hashed and signed, following the
//! [AWS canonical request rules](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html).
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        chronoutil::ParseRequestDate,
        constants::*,
        crypto::{sha256, sha256_hex},
        error::excerpt,
        SignatureError,
    },
    chrono::{DateTime, Utc},
    http::{
        header::{HeaderMap, HeaderValue},
        method::Method,
        request::Parts,
    },
    log::trace,
    qualifier_attr::qualifiers,
    std::{
        collections::{BTreeMap, HashMap},
        fmt::{Debug, Formatter, Result as FmtResult},
    },
};

/// Which part of the URI an element came from. Escape errors map to different AWS error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum UriElement {
    Path,
    Query,
}

/// The final line of a canonical request: what the signature says about the body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CanonicalPayload {
    /// Lower-case hex SHA-256 of the complete body.
    Sha256(String),

    /// The body is `aws-chunked` and each chunk carries its own signature.
    Streaming,
}

impl CanonicalPayload {
    /// Hash a complete body.
    pub fn from_body(body: &[u8]) -> Self {
        Self::Sha256(sha256_hex(body))
    }

    /// The literal text placed in the canonical request.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sha256(hex) => hex,
            Self::Streaming => XACS_STREAMING_AWS4_HMAC_SHA256_PAYLOAD,
        }
    }
}

/// The normalized form of a request used to build the SigV4 canonical request.
///
/// Only headers named in `SignedHeaders` are retained. A signed header that is absent from the request is an error
/// at construction time, so the header block always matches the signed header list exactly.
#[derive(Clone)]
pub struct CanonicalRequest {
    /// The HTTP method for the request (e.g., "GET", "POST", etc.)
    request_method: String,

    /// The canonicalized path from the HTTP request. This is guaranteed to be ASCII.
    canonical_path: String,

    /// Decoded query parameters. A key may appear more than once.
    query_parameters: HashMap<String, Vec<String>>,

    /// Signed header names (lower-case) mapped to their folded value: trimmed, space-collapsed, sorted, and joined
    /// with commas.
    signed_headers: BTreeMap<String, String>,

    /// The request timestamp, from `x-amz-date` or `Date`.
    request_timestamp: DateTime<Utc>,
}

impl CanonicalRequest {
    /// Build a canonical request from the header portion of an HTTP request.
    pub fn from_parts(parts: &Parts, signed_headers: &[String]) -> Result<Self, SignatureError> {
        let query_parameters = query_string_to_map(parts.uri.query().unwrap_or(""))?;
        let request_timestamp = request_timestamp(&parts.headers)?;
        Self::new(&parts.method, parts.uri.path(), query_parameters, &parts.headers, signed_headers, request_timestamp)
    }

    /// Build a canonical request from already-separated components. `uri_path` is the raw (still percent-encoded)
    /// path; `query_parameters` are decoded.
    pub fn new(
        method: &Method,
        uri_path: &str,
        query_parameters: HashMap<String, Vec<String>>,
        headers: &HeaderMap<HeaderValue>,
        signed_headers: &[String],
        request_timestamp: DateTime<Utc>,
    ) -> Result<Self, SignatureError> {
        let canonical_path = canonicalize_uri_path(uri_path)?;

        let mut folded = BTreeMap::new();
        for name in signed_headers {
            let name = name.to_ascii_lowercase();
            match fold_header_values(headers, &name) {
                Some(value) => {
                    folded.insert(name, value);
                }
                None => {
                    trace!("CanonicalRequest: signed header {} is not present", name);
                    return Err(SignatureError::MissingRequiredHeader(format!(
                        "'{}' is listed in SignedHeaders but is not present in the request.",
                        excerpt(&name)
                    )));
                }
            }
        }

        Ok(Self {
            request_method: method.as_str().to_string(),
            canonical_path,
            query_parameters,
            signed_headers: folded,
            request_timestamp,
        })
    }

    /// Retrieve the HTTP request method.
    #[inline(always)]
    pub fn request_method(&self) -> &str {
        &self.request_method
    }

    /// Retrieve the canonicalized URI path from the request.
    #[inline(always)]
    pub fn canonical_path(&self) -> &str {
        &self.canonical_path
    }

    /// Retrieve the decoded query parameters.
    #[inline(always)]
    pub fn query_parameters(&self) -> &HashMap<String, Vec<String>> {
        &self.query_parameters
    }

    /// Retrieve the folded signed headers, keyed by lower-case name.
    #[inline(always)]
    pub fn signed_headers(&self) -> &BTreeMap<String, String> {
        &self.signed_headers
    }

    /// Retrieve the request timestamp.
    #[inline(always)]
    pub fn request_timestamp(&self) -> DateTime<Utc> {
        self.request_timestamp
    }

    /// The `;`-joined signed header names, as they appear in the canonical request and `SignedHeaders`.
    pub fn signed_header_names(&self) -> String {
        self.signed_headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
    }

    /// Get the canonical query string from the request.
    pub fn canonical_query_string(&self) -> String {
        canonicalize_query_to_string(&self.query_parameters)
    }

    /// Get the [canonical request to hash](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html)
    /// for the request.
    pub fn canonical_request(&self, payload: &CanonicalPayload) -> Vec<u8> {
        let mut result = Vec::with_capacity(1024);
        result.extend(self.request_method().as_bytes());
        result.push(b'\n');
        result.extend(self.canonical_path().as_bytes());
        result.push(b'\n');
        result.extend(self.canonical_query_string().as_bytes());
        result.push(b'\n');

        for (name, value) in self.signed_headers.iter() {
            result.extend(name.as_bytes());
            result.push(b':');
            result.extend(value.as_bytes());
            result.push(b'\n');
        }

        result.push(b'\n');
        result.extend(self.signed_header_names().as_bytes());
        result.push(b'\n');
        result.extend(payload.as_str().as_bytes());

        trace!("Canonical request:\n{}", String::from_utf8_lossy(&result));

        result
    }

    /// Get the SHA-256 hash of the [canonical request](https://docs.aws.amazon.com/general/latest/gr/sigv4-create-canonical-request.html).
    pub fn canonical_request_sha256(&self, payload: &CanonicalPayload) -> [u8; SHA256_OUTPUT_LEN] {
        sha256(&self.canonical_request(payload))
    }
}

impl Debug for CanonicalRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CanonicalRequest")
            .field("request_method", &self.request_method)
            .field("canonical_path", &self.canonical_path)
            .field("query_parameters", &self.query_parameters)
            .field("signed_headers", &self.signed_headers)
            .field("request_timestamp", &self.request_timestamp)
            .finish()
    }
}

/// Resolve the request timestamp. `x-amz-date` (ISO 8601 basic format) is preferred; `Date` (RFC 1123) is the
/// fallback.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn request_timestamp(headers: &HeaderMap<HeaderValue>) -> Result<DateTime<Utc>, SignatureError> {
    // Only the first value of each header is considered.
    let amz_date = headers.get(HDR_X_AMZ_DATE).map(|v| latin1_to_string(v.as_bytes()));
    let date = headers.get(HDR_DATE).map(|v| latin1_to_string(v.as_bytes()));

    if let Some(amz_date) = amz_date.as_deref() {
        if let Ok(ts) = DateTime::<Utc>::parse_from_amz_date(amz_date.trim()) {
            return Ok(ts);
        }
        trace!("request_timestamp: x-amz-date '{}' is not ISO 8601 basic format", amz_date);
    }

    if let Some(date) = date.as_deref() {
        if let Ok(ts) = DateTime::<Utc>::parse_from_http_date(date) {
            return Ok(ts);
        }
        trace!("request_timestamp: date '{}' is not an HTTP date", date);
    }

    match amz_date.or(date) {
        None => Err(SignatureError::MissingRequiredHeader(MSG_AUTH_HEADER_REQ_DATE.to_string())),
        Some(raw) => Err(SignatureError::IncompleteSignature(format!(
            "Date must be in ISO-8601 'basic format'. Got '{}'. See http://en.wikipedia.org/wiki/ISO_8601",
            excerpt(&raw)
        ))),
    }
}

/// Gather every value of `name`, normalize each, sort, and join with commas. Returns `None` if the header is
/// absent.
fn fold_header_values(headers: &HeaderMap<HeaderValue>, name: &str) -> Option<String> {
    let mut values: Vec<String> =
        headers.get_all(name).iter().map(|v| latin1_to_string(&normalize_header_value(v.as_bytes()))).collect();

    if values.is_empty() {
        return None;
    }

    values.sort();
    Some(values.join(","))
}

/// Normalizes the specified query parameters into the AWS canonical query string: every key and value is
/// percent-encoded (including `/`), the pairs are sorted by key and then value, and joined with `&`.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn canonicalize_query_to_string(query_parameters: &HashMap<String, Vec<String>>) -> String {
    let mut pairs = Vec::new();

    for (key, values) in query_parameters.iter() {
        let key = uri_encode(key.as_bytes(), true);
        for value in values.iter() {
            pairs.push((key.clone(), uri_encode(value.as_bytes(), true)));
        }
    }

    pairs.sort();
    pairs.into_iter().map(|(key, value)| format!("{}={}", key, value)).collect::<Vec<_>>().join("&")
}

/// Normalizes the path component according to RFC 3986 and the SigV4 rules.
///
/// Percent escapes are decoded first. The decoded path is split on `/`; empty interior segments and `.` segments
/// are dropped, and `..` removes the previously retained segment. Each segment is then re-encoded with only the
/// unreserved characters left literal.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn canonicalize_uri_path(uri_path: &str) -> Result<String, SignatureError> {
    // Special case: empty path is converted to '/'
    if uri_path.is_empty() || uri_path == "/" {
        return Ok("/".to_string());
    }

    // All other paths must be absolute.
    if !uri_path.starts_with('/') {
        return Err(SignatureError::InvalidURIPath(format!("Path is not absolute: {}", excerpt(uri_path))));
    }

    let decoded = percent_decode(uri_path, UriElement::Path)?;
    normalize_decoded_path(&decoded).ok_or_else(|| {
        SignatureError::InvalidURIPath(format!(
            "Relative path entry '..' navigates above root: {}",
            excerpt(uri_path)
        ))
    })
}

/// Normalize an already-decoded absolute path. `/` separators are emitted literally. Returns `None` if a `..`
/// segment would navigate above the root.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_decoded_path(path: &[u8]) -> Option<String> {
    let segments: Vec<&[u8]> = path.split(|c| *c == b'/').collect();
    let last = segments.len() - 1;

    // The first retained segment is the empty string before the leading slash.
    let mut retained: Vec<&[u8]> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.into_iter().enumerate() {
        match segment {
            b"" if i != 0 && i != last => (),
            b"." => (),
            b".." => {
                if retained.len() <= 1 {
                    return None;
                }
                retained.pop();
            }
            _ => retained.push(segment),
        }
    }

    let result = retained.iter().map(|segment| uri_encode(segment, true)).collect::<Vec<_>>().join("/");
    if result.is_empty() {
        Some("/".to_string())
    } else {
        Some(result)
    }
}

/// Percent-encode `bytes`, leaving only RFC 3986 unreserved characters literal. `/` is left literal when
/// `encode_slash` is false.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn uri_encode(bytes: &[u8], encode_slash: bool) -> String {
    let mut result = String::with_capacity(bytes.len() * 3);
    for &c in bytes {
        if is_rfc3986_unreserved(c) || (c == b'/' && !encode_slash) {
            result.push(c as char);
        } else {
            let hex = u8_to_upper_hex(c);
            result.push('%');
            result.push(hex[0] as char);
            result.push(hex[1] as char);
        }
    }
    result
}

/// Decode `%XX` escapes. In query strings, `+` is a space.
fn percent_decode(element: &str, element_type: UriElement) -> Result<Vec<u8>, SignatureError> {
    let bytes = element.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if i + 2 >= bytes.len() {
                    // % encoding would go beyond end of string.
                    return Err(match element_type {
                        UriElement::Path => SignatureError::InvalidURIPath(MSG_INCOMPLETE_TRAILING_ESCAPE.to_string()),
                        UriElement::Query => {
                            SignatureError::MalformedQueryString(MSG_INCOMPLETE_TRAILING_ESCAPE.to_string())
                        }
                    });
                }

                let hex_digits = &bytes[i + 1..i + 3];
                let mut value = [0u8; 1];
                if hex::decode_to_slice(hex_digits, &mut value).is_err() {
                    let message = format!("{}{}{}", MSG_ILLEGAL_HEX_CHAR, hex_digits[0] as char, hex_digits[1] as char);
                    return Err(match element_type {
                        UriElement::Path => SignatureError::InvalidURIPath(message),
                        UriElement::Query => SignatureError::MalformedQueryString(message),
                    });
                }

                result.push(value[0]);
                i += 3;
            }
            b'+' if element_type == UriElement::Query => {
                result.push(b' ');
                i += 1;
            }
            c => {
                result.push(c);
                i += 1;
            }
        }
    }

    Ok(result)
}

/// Parse a raw query string into a map of decoded keys to decoded values. A key may appear multiple times; values
/// keep their order of appearance. A parameter without `=` has an empty value.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn query_string_to_map(query_string: &str) -> Result<HashMap<String, Vec<String>>, SignatureError> {
    let mut result = HashMap::<String, Vec<String>>::new();

    for component in query_string.split('&') {
        if component.is_empty() {
            continue;
        }

        let (key, value) = component.split_once('=').unwrap_or((component, ""));
        let key = decode_query_element(key)?;
        let value = decode_query_element(value)?;
        result.entry(key).or_default().push(value);
    }

    Ok(result)
}

fn decode_query_element(element: &str) -> Result<String, SignatureError> {
    let decoded = percent_decode(element, UriElement::Query)?;
    String::from_utf8(decoded).map_err(|_| {
        SignatureError::MalformedQueryString(format!(
            "Query string element is not valid UTF-8 after decoding: {}",
            excerpt(element)
        ))
    })
}

/// Indicates whether the specified byte is RFC3986 unreserved -- i.e., can be represented without being
/// percent-encoded, e.g. '?' -> '%3F'.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
fn is_rfc3986_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b'_' || c == b'~'
}

/// Convert a Latin-1 slice of bytes to a UTF-8 string.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

/// Normalizes a header value by trimming whitespace and converting multiple spaces to a single space.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn normalize_header_value(value: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(value.len());

    // Leading whitespace is skipped because we start as though a space was just seen.
    let mut last_was_space = true;

    for &c in value {
        if c == b' ' || c == b'\t' {
            if !last_was_space {
                result.push(b' ');
                last_was_space = true;
            }
        } else {
            result.push(c);
            last_was_space = false;
        }
    }

    // At most one trailing space can have been emitted.
    if result.last() == Some(&b' ') {
        result.pop();
    }

    result
}

/// Convert a byte into two uppercase hex digits.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
const fn u8_to_upper_hex(b: u8) -> [u8; 2] {
    [HEX_DIGITS_UPPER[((b >> 4) & 0xf) as usize], HEX_DIGITS_UPPER[(b & 0xf) as usize]]
}
