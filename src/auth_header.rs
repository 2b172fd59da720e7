//! Strict parser for the SigV4 `Authorization` header.
//!
//! The accepted shape is
//! `AWS4-HMAC-SHA256 Credential=<key>/<date>/<region>/<service>/aws4_request, SignedHeaders=<a;b;c>, Signature=<hex>`
//! with exactly three comma-separated sections in that order. Parameter names are matched case-insensitively.

use {
    crate::{constants::*, error::excerpt, ScopeInfo, SignatureError},
    log::trace,
    std::{
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

/// A parsed SigV4 `Authorization` header.
#[derive(Clone, Eq, PartialEq)]
pub struct V4AuthHeader {
    access_key: String,
    scope: ScopeInfo,
    signed_headers: Vec<String>,
    signature: [u8; SHA256_OUTPUT_LEN],
}

impl V4AuthHeader {
    /// Assemble a header from its parts. Signed header names are lower-cased and sorted.
    pub fn new<A: Into<String>>(
        access_key: A,
        scope: ScopeInfo,
        signed_headers: &[&str],
        signature: [u8; SHA256_OUTPUT_LEN],
    ) -> Self {
        let mut signed_headers: Vec<String> = signed_headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        signed_headers.sort();

        Self {
            access_key: access_key.into(),
            scope,
            signed_headers,
            signature,
        }
    }

    /// The access key id from the `Credential` parameter.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// The credential scope from the `Credential` parameter.
    #[inline]
    pub fn scope(&self) -> &ScopeInfo {
        &self.scope
    }

    /// The lower-cased, sorted header names from the `SignedHeaders` parameter.
    #[inline]
    pub fn signed_headers(&self) -> &[String] {
        &self.signed_headers
    }

    /// The decoded 32-byte signature.
    #[inline]
    pub fn signature(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.signature
    }
}

impl Debug for V4AuthHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("V4AuthHeader")
            .field("access_key", &self.access_key)
            .field("scope", &self.scope.to_string())
            .field("signed_headers", &self.signed_headers)
            .field("signature", &hex::encode(self.signature))
            .finish()
    }
}

impl Display for V4AuthHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} {}={}/{}, {}={}, {}={}",
            AWS4_HMAC_SHA256,
            CREDENTIAL,
            self.access_key,
            self.scope,
            SIGNED_HEADERS,
            self.signed_headers.join(";"),
            SIGNATURE,
            hex::encode(self.signature)
        )
    }
}

impl FromStr for V4AuthHeader {
    type Err = SignatureError;

    fn from_str(raw: &str) -> Result<Self, SignatureError> {
        let header = raw.trim();

        let (algorithm, parameters) = match header.split_once(|c: char| c.is_ascii_whitespace()) {
            Some((algorithm, parameters)) => (algorithm, parameters.trim()),
            None => (header, ""),
        };

        if algorithm != AWS4_HMAC_SHA256 {
            return Err(SignatureError::IncompleteSignature(format!(
                "{}'{}'.",
                MSG_UNSUPPORTED_ALGORITHM,
                excerpt(algorithm)
            )));
        }

        let sections: Vec<&str> = parameters.split(',').map(str::trim).collect();
        if sections.len() != 3 {
            trace!("V4AuthHeader: expected 3 sections, got {}", sections.len());
            return Err(SignatureError::IncompleteSignature(format!(
                "{} {} {} Authorization={}",
                MSG_AUTH_HEADER_REQ_CREDENTIAL,
                MSG_AUTH_HEADER_REQ_SIGNED_HEADERS,
                MSG_AUTH_HEADER_REQ_SIGNATURE,
                excerpt(header)
            )));
        }

        let credential = section_value(sections[0], CREDENTIAL, MSG_AUTH_HEADER_REQ_CREDENTIAL, header)?;
        let signed_headers = section_value(sections[1], SIGNED_HEADERS, MSG_AUTH_HEADER_REQ_SIGNED_HEADERS, header)?;
        let signature = section_value(sections[2], SIGNATURE, MSG_AUTH_HEADER_REQ_SIGNATURE, header)?;

        // Credential: keyid/date/region/service/aws4_request
        let (access_key, scope) = match credential.split_once('/') {
            Some((access_key, scope)) if credential.split('/').count() == 5 => (access_key, scope),
            _ => {
                return Err(SignatureError::IncompleteSignature(format!(
                    "{} got '{}'",
                    MSG_CREDENTIAL_MUST_HAVE_FIVE_PARTS,
                    excerpt(credential)
                )))
            }
        };

        if access_key.is_empty() {
            return Err(SignatureError::IncompleteSignature(format!(
                "Credential is missing the access key id. Authorization={}",
                excerpt(header)
            )));
        }

        let scope = ScopeInfo::from_str(scope)?;

        let signed_headers: Vec<String> = signed_headers.split(';').map(|h| h.to_ascii_lowercase()).collect();
        if signed_headers.iter().any(String::is_empty) {
            return Err(SignatureError::IncompleteSignature(format!(
                "SignedHeaders contains an empty header name. Authorization={}",
                excerpt(header)
            )));
        }

        let mut signed_headers = signed_headers;
        signed_headers.sort();

        let mut signature_bytes = [0u8; SHA256_OUTPUT_LEN];
        if hex::decode_to_slice(signature, &mut signature_bytes).is_err() {
            return Err(SignatureError::IncompleteSignature(format!(
                "Signature must be {} hexadecimal characters. Authorization={}",
                SHA256_HEX_LENGTH,
                excerpt(header)
            )));
        }

        Ok(Self {
            access_key: access_key.to_string(),
            scope,
            signed_headers,
            signature: signature_bytes,
        })
    }
}

/// Split `Name=value`, requiring `Name` to match `expected` case-insensitively.
fn section_value<'a>(
    section: &'a str,
    expected: &str,
    missing_message: &str,
    header: &str,
) -> Result<&'a str, SignatureError> {
    match section.split_once('=') {
        Some((name, value)) if name.trim().eq_ignore_ascii_case(expected) => Ok(value.trim()),
        Some(_) => Err(SignatureError::IncompleteSignature(format!("{} Authorization={}", missing_message, excerpt(header)))),
        None => Err(SignatureError::IncompleteSignature(format!(
            "'{}' not a valid key=value pair (missing equal-sign) in Authorization header: '{}'",
            excerpt(section),
            excerpt(header)
        ))),
    }
}
