//! AWS SigV4 request signature verification routines.
//!
//! This implements the server side of [SigV4](http://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
//! header authentication for S3, for both whole-body requests and the seed signature of
//! [streamed chunked uploads](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-streaming.html).
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::{
        constants::*, CanonicalPayload, CanonicalRequest, GetSecretKeyRequest, GetSecretKeyResponse, KSecretKey,
        KSigningKey, ScopeInfo, SignatureError, V4AuthHeader,
    },
    chrono::{DateTime, Duration, Utc},
    derive_builder::Builder,
    http::request::Parts,
    log::{debug, trace},
    qualifier_attr::qualifiers,
    scratchstack_aws_principal::{Principal, SessionData},
    std::{
        fmt::{Debug, Formatter, Result as FmtResult},
        future::Future,
    },
    subtle::ConstantTimeEq,
    tower::{BoxError, Service, ServiceExt},
};

/// Low-level structure for performing AWS SigV4 authentication after a canonical request has been generated.
#[derive(Builder, Clone)]
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[builder(derive(Debug))]
pub struct SigV4Authenticator {
    /// The SHA-256 hash of the canonical request.
    canonical_request_sha256: [u8; SHA256_OUTPUT_LEN],

    /// The access key from the `Credential` parameter.
    #[builder(setter(into))]
    access_key: String,

    /// The credential scope from the `Credential` parameter. The date must reflect that of the request timestamp,
    /// not the server's date. Timestamp validation is performed separately.
    scope: ScopeInfo,

    /// The optional session token.
    #[builder(setter(into, strip_option), default)]
    session_token: Option<String>,

    /// The signature passed into the request.
    signature: [u8; SHA256_OUTPUT_LEN],

    /// The timestamp of the request, from either the `X-Amz-Date` or `Date` header.
    request_timestamp: DateTime<Utc>,
}

impl SigV4Authenticator {
    /// Create a builder for `SigV4Authenticator`.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn builder() -> SigV4AuthenticatorBuilder {
        SigV4AuthenticatorBuilder::default()
    }

    /// Create an authenticator for a request whose canonical form and `Authorization` header have been parsed.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn for_request(
        canonical_request: &CanonicalRequest,
        auth_header: &V4AuthHeader,
        payload: &CanonicalPayload,
        session_token: Option<String>,
    ) -> Self {
        Self {
            canonical_request_sha256: canonical_request.canonical_request_sha256(payload),
            access_key: auth_header.access_key().to_string(),
            scope: auth_header.scope().clone(),
            session_token,
            signature: *auth_header.signature(),
            request_timestamp: canonical_request.request_timestamp(),
        }
    }

    /// Retrieve the SHA-256 hash of the canonical request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn canonical_request_sha256(&self) -> [u8; SHA256_OUTPUT_LEN] {
        self.canonical_request_sha256
    }

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn access_key(&self) -> &str {
        &self.access_key
    }

    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn scope(&self) -> &ScopeInfo {
        &self.scope
    }

    /// Retrieve the optional session token.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Retrieve the signature passed into the request. For a chunked upload this is the seed signature.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn signature(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.signature
    }

    /// Retrieve the timestamp of the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    #[inline(always)]
    fn request_timestamp(&self) -> DateTime<Utc> {
        self.request_timestamp
    }

    /// Verify the request parameters make sense for the region, service, and specified timestamp.
    /// This must be called successfully before calling [validate_signature][Self::validate_signature].
    ///
    /// The scope date must always match the request timestamp. The region and service are checked only if expected
    /// values are supplied, and the clock skew only if `allowed_mismatch` is supplied.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn prevalidate(
        &self,
        region: Option<&str>,
        service: Option<&str>,
        server_timestamp: DateTime<Utc>,
        allowed_mismatch: Option<Duration>,
    ) -> Result<(), SignatureError> {
        prevalidate_scope(self.scope(), self.request_timestamp(), region, service, server_timestamp, allowed_mismatch)
    }

    /// Return the string to sign for the request.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    fn get_string_to_sign(&self) -> Vec<u8> {
        string_to_sign(self.request_timestamp(), self.scope(), &self.canonical_request_sha256())
    }

    /// Validate the request signature.
    #[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
    #[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
    async fn validate_signature<S, F>(
        &self,
        region: Option<&str>,
        service: Option<&str>,
        server_timestamp: DateTime<Utc>,
        allowed_mismatch: Option<Duration>,
        get_secret_key: &mut S,
    ) -> Result<SigV4AuthenticatorResponse, SignatureError>
    where
        S: Service<GetSecretKeyRequest, Response = GetSecretKeyResponse, Error = BoxError, Future = F> + Send,
        F: Future<Output = Result<GetSecretKeyResponse, BoxError>> + Send,
    {
        self.prevalidate(region, service, server_timestamp, allowed_mismatch)?;
        let string_to_sign = self.get_string_to_sign();
        trace!("String to sign:\n{}", String::from_utf8_lossy(string_to_sign.as_ref()));

        let response =
            get_secret_key_for(get_secret_key, self.access_key(), self.session_token().map(|x| x.to_string()))
                .await?;
        let signing_key = response.secret_key().to_ksigning_for_scope(self.scope());
        let expected_signature = signing_key.sign(&string_to_sign);

        let is_equal: bool = self.signature().ct_eq(&expected_signature).into();
        if !is_equal {
            trace!(
                "Signature mismatch: expected '{}', got '{}'",
                hex::encode(expected_signature),
                hex::encode(self.signature())
            );
            return Err(SignatureError::SignatureDoesNotMatch(Some(MSG_REQUEST_SIGNATURE_MISMATCH.to_string())));
        }

        debug!("validate_signature: SigV4 signature verified for access key {}", self.access_key());
        Ok(SigV4AuthenticatorResponse {
            principal: response.principal,
            session_data: response.session_data,
            signing_key,
        })
    }
}

impl Debug for SigV4Authenticator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SigV4Authenticator")
            .field("canonical_request_sha256", &hex::encode(self.canonical_request_sha256()))
            .field("access_key", &self.access_key())
            .field("scope", &self.scope().to_string())
            .field("session_token", &self.session_token())
            .field("signature", &hex::encode(self.signature()))
            .field("request_timestamp", &self.request_timestamp())
            .finish()
    }
}

/// Check the credential scope and request timestamp of a SigV4 request against the server's expectations.
///
/// This needs neither the secret key nor the payload hash, so it can run before the body is read.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn prevalidate_scope(
    scope: &ScopeInfo,
    req_ts: DateTime<Utc>,
    region: Option<&str>,
    service: Option<&str>,
    server_timestamp: DateTime<Utc>,
    allowed_mismatch: Option<Duration>,
) -> Result<(), SignatureError> {
    if let Some(allowed_mismatch) = allowed_mismatch {
        let min_ts = server_timestamp.checked_sub_signed(allowed_mismatch).unwrap_or(server_timestamp);
        let max_ts = server_timestamp.checked_add_signed(allowed_mismatch).unwrap_or(server_timestamp);

        // Make sure date isn't expired...
        if req_ts < min_ts {
            trace!("prevalidate: request timestamp {} is before minimum timestamp {}", req_ts, min_ts);
            return Err(SignatureError::SignatureDoesNotMatch(Some(format!(
                "Signature expired: {} is now earlier than {} ({} - {}.)",
                req_ts.format(ISO8601_COMPACT_FORMAT),
                min_ts.format(ISO8601_COMPACT_FORMAT),
                server_timestamp.format(ISO8601_COMPACT_FORMAT),
                duration_to_string(allowed_mismatch)
            ))));
        }

        // ... or too far into the future.
        if req_ts > max_ts {
            trace!("prevalidate: request timestamp {} is after maximum timestamp {}", req_ts, max_ts);
            return Err(SignatureError::SignatureDoesNotMatch(Some(format!(
                "Signature not yet current: {} is still later than {} ({} + {}.)",
                req_ts.format(ISO8601_COMPACT_FORMAT),
                max_ts.format(ISO8601_COMPACT_FORMAT),
                server_timestamp.format(ISO8601_COMPACT_FORMAT),
                duration_to_string(allowed_mismatch)
            ))));
        }
    }

    let mut cscope_errors = Vec::new();

    if let Some(region) = region {
        if scope.region() != region {
            trace!("prevalidate: credential region '{}' does not match expected region '{}'", scope.region(), region);
            cscope_errors.push(format!("Credential should be scoped to a valid region, not '{}'.", scope.region()));
        }
    }

    if let Some(service) = service {
        if scope.service() != service {
            trace!(
                "prevalidate: credential service '{}' does not match expected service '{}'",
                scope.service(),
                service
            );
            cscope_errors.push(format!("Credential should be scoped to correct service: '{}'.", service));
        }
    }

    let expected_cscope_date = req_ts.format(ISO8601_DATE_FORMAT).to_string();
    if scope.date_stamp() != expected_cscope_date {
        trace!(
            "prevalidate: credential date '{}' does not match expected date '{}'",
            scope.date_stamp(),
            expected_cscope_date
        );
        cscope_errors.push(format!(
            "Date in Credential scope does not match YYYYMMDD from ISO-8601 version of date from HTTP: '{}' != '{}', from '{}'.",
            scope.date_stamp(),
            expected_cscope_date,
            req_ts.format(ISO8601_COMPACT_FORMAT)
        ));
    }

    if !cscope_errors.is_empty() {
        return Err(SignatureError::SignatureDoesNotMatch(Some(cscope_errors.join(" "))));
    }

    Ok(())
}

/// Upon successful authentication of a signature, this is returned to convey the principal and session data
/// associated with the request, along with the signing key needed to verify any chunk signatures that follow.
#[derive(Clone, Debug)]
pub struct SigV4AuthenticatorResponse {
    /// The principal actors of the request.
    principal: Principal,

    /// The session data associated with the principal.
    session_data: SessionData,

    /// The `kSigning` key for the request's scope.
    signing_key: KSigningKey,
}

impl SigV4AuthenticatorResponse {
    /// Retrieve the principal actors of the request.
    #[inline]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Retrieve the session data associated with the principal.
    #[inline]
    pub fn session_data(&self) -> &SessionData {
        &self.session_data
    }

    /// Retrieve the signing key derived for the request's scope.
    #[inline]
    pub fn signing_key(&self) -> &KSigningKey {
        &self.signing_key
    }

    pub(crate) fn into_parts(self) -> (Principal, SessionData, KSigningKey) {
        (self.principal, self.session_data, self.signing_key)
    }
}

/// Build the SigV4 string to sign:
/// `AWS4-HMAC-SHA256\n<ISO8601 basic timestamp>\n<scope>\n<hex SHA-256 of canonical request>`.
#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn string_to_sign(
    timestamp: DateTime<Utc>,
    scope: &ScopeInfo,
    canonical_request_sha256: &[u8; SHA256_OUTPUT_LEN],
) -> Vec<u8> {
    let scope = scope.to_string();
    let mut result =
        Vec::with_capacity(AWS4_HMAC_SHA256.len() + 1 + ISO8601_UTC_LENGTH + 1 + scope.len() + 1 + SHA256_HEX_LENGTH);

    result.extend(AWS4_HMAC_SHA256.as_bytes());
    result.push(b'\n');
    result.extend(timestamp.format(ISO8601_COMPACT_FORMAT).to_string().as_bytes());
    result.push(b'\n');
    result.extend(scope.as_bytes());
    result.push(b'\n');
    result.extend(hex::encode(canonical_request_sha256).as_bytes());
    result
}

/// Look up the secret key for an access key, converting service errors back into [SignatureError] where possible.
pub(crate) async fn get_secret_key_for<S, F>(
    get_secret_key: &mut S,
    access_key: &str,
    session_token: Option<String>,
) -> Result<GetSecretKeyResponse, SignatureError>
where
    S: Service<GetSecretKeyRequest, Response = GetSecretKeyResponse, Error = BoxError, Future = F> + Send,
    F: Future<Output = Result<GetSecretKeyResponse, BoxError>> + Send,
{
    let req = GetSecretKeyRequest::builder()
        .access_key(access_key)
        .session_token(session_token)
        .build()
        .expect("All fields set");

    match get_secret_key.oneshot(req).await {
        Ok(response) => {
            trace!("get_secret_key: got secret key");
            Ok(response)
        }
        Err(e) => {
            debug!("get_secret_key: error getting secret key: {}", e);
            Err(SignatureError::from(e))
        }
    }
}

/// Sign a request with SigV4, returning the `Authorization` header to attach.
///
/// The request must already carry every header in `signed_headers` as well as an `x-amz-date` or `Date` header.
/// The credential scope is derived from the request timestamp and the given region and service.
pub fn sign_v4_request(
    parts: &Parts,
    access_key: &str,
    secret_key: &KSecretKey,
    region: &str,
    service: &str,
    signed_headers: &[&str],
    payload: &CanonicalPayload,
) -> Result<V4AuthHeader, SignatureError> {
    let names: Vec<String> = signed_headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let canonical_request = CanonicalRequest::from_parts(parts, &names)?;
    let timestamp = canonical_request.request_timestamp();
    let scope = ScopeInfo::for_date(timestamp.date_naive(), region, service);

    let string_to_sign = string_to_sign(timestamp, &scope, &canonical_request.canonical_request_sha256(payload));
    let signature = secret_key.to_ksigning_for_scope(&scope).sign(&string_to_sign);

    Ok(V4AuthHeader::new(access_key, scope, signed_headers, signature))
}

fn duration_to_string(duration: Duration) -> String {
    let secs = duration.num_seconds();
    if secs % 60 == 0 {
        format!("{} min", duration.num_minutes())
    } else {
        format!("{} sec", secs)
    }
}
