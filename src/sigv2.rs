//! AWS Signature Version 2 (HMAC-SHA1) signing and verification for S3.
//!
//! The `Authorization` header has the form `AWS <AccessKeyId>:<Signature>`, where
//! `Signature = Base64(HMAC-SHA1(SecretKey, StringToSign))` and:
//!
//! ```text
//! StringToSign = HTTP-Verb + "\n" +
//!                Content-MD5 + "\n" +
//!                Content-Type + "\n" +
//!                Date + "\n" +
//!                CanonicalizedAmzHeaders +
//!                CanonicalizedResource
//! ```

use {
    crate::{
        auth::get_secret_key_for,
        canonical::{latin1_to_string, query_string_to_map},
        constants::*,
        crypto::hmac_sha1,
        error::excerpt,
        GetSecretKeyRequest, GetSecretKeyResponse, KSecretKey, SignatureError,
    },
    base64::{engine::general_purpose::STANDARD as BASE64, Engine},
    http::{request::Parts, HeaderMap},
    log::{debug, trace},
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter, Result as FmtResult},
        future::Future,
        str::FromStr,
    },
    subtle::ConstantTimeEq,
    tower::{BoxError, Service},
};

/// A parsed SigV2 `Authorization` header: `AWS <AccessKeyId>:<Signature>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SigV2Authorization {
    access_key: String,
    signature: String,
}

impl SigV2Authorization {
    /// Create a new SigV2 authorization from an access key and a Base64-encoded signature.
    pub fn new<A: Into<String>, S: Into<String>>(access_key: A, signature: S) -> Self {
        Self {
            access_key: access_key.into(),
            signature: signature.into(),
        }
    }

    /// The access key of the request.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// The Base64-encoded signature of the request.
    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Verify the signature against the request using the given secret key.
    pub fn verify(&self, parts: &Parts, secret_key: &KSecretKey) -> Result<(), SignatureError> {
        let string_to_sign = string_to_sign(parts)?;
        trace!("SigV2 string to sign:\n{}", string_to_sign);

        let expected = Self::new(self.access_key(), compute_signature(secret_key, &string_to_sign)).to_string();
        let provided = self.to_string();

        let is_equal: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
        if !is_equal {
            debug!("SigV2 signature mismatch for access key {}", self.access_key());
            return Err(SignatureError::SignatureDoesNotMatch(Some(MSG_REQUEST_SIGNATURE_MISMATCH.to_string())));
        }

        Ok(())
    }

    /// Look up the secret key for the request's access key and verify the signature.
    pub async fn validate_signature<S, F>(
        &self,
        parts: &Parts,
        session_token: Option<String>,
        get_secret_key: &mut S,
    ) -> Result<GetSecretKeyResponse, SignatureError>
    where
        S: Service<GetSecretKeyRequest, Response = GetSecretKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSecretKeyResponse, BoxError>> + Send,
    {
        let response = get_secret_key_for(get_secret_key, self.access_key(), session_token).await?;
        self.verify(parts, response.secret_key())?;
        debug!("validate_signature: SigV2 signature verified for access key {}", self.access_key());
        Ok(response)
    }
}

impl Display for SigV2Authorization {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}{}:{}", AWS_V2_PREFIX, self.access_key, self.signature)
    }
}

impl FromStr for SigV2Authorization {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, SignatureError> {
        let malformed = || {
            SignatureError::IncompleteSignature(format!(
                "Authorization header must have the form 'AWS AccessKeyId:Signature'. Authorization={}",
                excerpt(s)
            ))
        };

        let rest = s.strip_prefix(AWS_V2_PREFIX).ok_or_else(malformed)?;
        let (access_key, signature) = rest.trim_start().split_once(':').ok_or_else(malformed)?;

        if access_key.is_empty() || signature.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(access_key, signature))
    }
}

/// Build the CanonicalizedAmzHeaders element: each `x-amz*` header, lowercased and sorted by name, as
/// `name:value1,value2\n`. Values are trimmed and embedded newlines are replaced by spaces.
pub fn canonicalized_amz_headers(headers: &HeaderMap) -> String {
    let mut amz_headers = BTreeMap::<&str, Vec<String>>::new();

    for (name, value) in headers.iter() {
        let name = name.as_str();
        if name.starts_with("x-amz") {
            let value = latin1_to_string(value.as_bytes()).replace(['\r', '\n'], " ");
            amz_headers.entry(name).or_default().push(value.trim().to_string());
        }
    }

    let mut result = String::new();
    for (name, values) in amz_headers {
        result.push_str(name);
        result.push(':');
        result.push_str(&values.join(","));
        result.push('\n');
    }

    result
}

/// Build the CanonicalizedResource element: the raw request path followed by any S3 sub-resources from the query
/// string, sorted, as `?key[=value]&...`.
///
/// A sub-resource appearing more than once is rejected.
pub fn canonicalized_resource(parts: &Parts) -> Result<String, SignatureError> {
    let mut result = parts.uri.path().to_string();
    let query = query_string_to_map(parts.uri.query().unwrap_or(""))?;

    let mut sub_resources: Vec<(&str, &str)> = Vec::new();
    for (key, values) in query.iter() {
        if !SIGV2_SUB_RESOURCES.contains(&key.as_str()) {
            continue;
        }

        match values.as_slice() {
            [value] => sub_resources.push((key.as_str(), value.as_str())),
            _ => {
                return Err(SignatureError::MalformedQueryString(format!(
                    "Sub-resource '{}' may only appear once in the query string",
                    key
                )))
            }
        }
    }

    sub_resources.sort_unstable();

    for (i, (key, value)) in sub_resources.iter().enumerate() {
        result.push(if i == 0 {
            '?'
        } else {
            '&'
        });
        result.push_str(key);
        if !value.is_empty() {
            result.push('=');
            result.push_str(value);
        }
    }

    Ok(result)
}

/// Build the SigV2 string to sign for a request.
///
/// The Date line is empty when an `x-amz-date` header is present; that header then appears in the
/// CanonicalizedAmzHeaders.
pub fn string_to_sign(parts: &Parts) -> Result<String, SignatureError> {
    let header = |name: &str| -> String {
        parts.headers.get(name).map(|value| latin1_to_string(value.as_bytes()).trim().to_string()).unwrap_or_default()
    };

    let date = if parts.headers.contains_key(HDR_X_AMZ_DATE) {
        String::new()
    } else {
        header(HDR_DATE)
    };

    Ok(format!(
        "{}\n{}\n{}\n{}\n{}{}",
        parts.method.as_str(),
        header(HDR_CONTENT_MD5),
        header(HDR_CONTENT_TYPE),
        date,
        canonicalized_amz_headers(&parts.headers),
        canonicalized_resource(parts)?
    ))
}

/// Compute the Base64-encoded HMAC-SHA1 signature of a string to sign.
pub fn compute_signature(secret_key: &KSecretKey, string_to_sign: &str) -> String {
    BASE64.encode(hmac_sha1(secret_key.as_ref(), string_to_sign.as_bytes()))
}

/// Sign a request with SigV2, returning the `Authorization` header to attach.
pub fn sign_v2_request(
    parts: &Parts,
    access_key: &str,
    secret_key: &KSecretKey,
) -> Result<SigV2Authorization, SignatureError> {
    let string_to_sign = string_to_sign(parts)?;
    Ok(SigV2Authorization::new(access_key, compute_signature(secret_key, &string_to_sign)))
}
