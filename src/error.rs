use {
    crate::constants::*,
    http::status::StatusCode,
    scratchstack_errors::ServiceError,
    std::{
        borrow::Cow,
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
        io::{Error as IOError, ErrorKind as IOErrorKind},
    },
};

/// Error returned when an attempt at authenticating an S3 request fails.
#[derive(Debug)]
#[non_exhaustive]
pub enum SignatureError {
    /// A body signed as a whole is larger than the configured maximum.
    EntityTooLarge(/* message */ String),

    /// The security token included with the request is expired.
    ExpiredToken(/* message */ String),

    /// Validation failed due to an underlying I/O error.
    IO(IOError),

    /// Validation failed due to an internal service error.
    InternalServiceError(Box<dyn Error + Send + Sync>),

    /// The AWS access key provided does not exist in our records.
    InvalidClientTokenId(/* message */ String),

    /// The request signature does not conform to AWS standards. Sample messages:
    /// `Authorization header requires 'Credential' parameter. Authorization=...`
    /// `Authorization header requires existence of either a 'X-Amz-Date' or a 'Date' header.`
    /// `Date must be in ISO-8601 'basic format'. Got '...'. See http://en.wikipedia.org/wiki/ISO_8601`
    /// `Unsupported AWS 'algorithm': 'AWS4-HMAC-SHA512'`
    IncompleteSignature(/* message */ String),

    /// The URI path includes invalid components. This can be a malformed hex encoding (e.g. `%0J`), a non-absolute
    /// URI path (`foo/bar`), or a URI path that attempts to navigate above the root (`/x/../../../y`).
    InvalidURIPath(/* message */ String),

    /// The `aws-chunked` body framing could not be decoded: a chunk header was oversized or unparseable, a chunk
    /// exceeded the configured maximum size, a chunk trailer was not CRLF, or the body ended before the final
    /// zero-length chunk.
    MalformedChunk(/* message */ String),

    /// A header was malformed -- the value could not be decoded as ASCII; the header was empty and this is not
    /// allowed (e.g. an `authorization` header); or the header could not be parsed.
    MalformedHeader(/* message */ String),

    /// A query parameter was malformed -- the value could not be decoded as UTF-8, or an S3 sub-resource was
    /// supplied more than once.
    ///
    /// `Incomplete trailing escape % sequence`
    MalformedQueryString(/* message */ String),

    /// The request did not use an authentication scheme this crate can verify. Sample messages:
    /// `Request is missing Authentication Token`
    MissingAuthenticationToken(/* message */ String),

    /// The request is missing a required header: a date header, or a header named in `SignedHeaders`.
    MissingRequiredHeader(/* message */ String),

    /// Signature did not match the calculated signature value. This covers the SigV2 signature, the SigV4
    /// request (seed) signature, and each chunk signature of a streamed payload.
    /// Example messages:
    /// `The request signature we calculated does not match the signature you provided. Check your AWS Secret Access Key and signing method. Consult the service documentation for details.`
    /// `Signature expired: 20210502T144040Z is now earlier than 20210502T173143Z (20210502T174643Z - 15 min.)`
    /// `Signature not yet current: 20210502T183640Z is still later than 20210502T175140Z (20210502T173640Z + 15 min.)`
    SignatureDoesNotMatch(Option</* message */ String>),
}

impl SignatureError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EntityTooLarge(_) => ERR_CODE_ENTITY_TOO_LARGE,
            Self::ExpiredToken(_) => ERR_CODE_EXPIRED_TOKEN,
            Self::IO(_) | Self::InternalServiceError(_) => ERR_CODE_INTERNAL_FAILURE,
            Self::InvalidClientTokenId(_) => ERR_CODE_INVALID_CLIENT_TOKEN_ID,
            Self::IncompleteSignature(_) => ERR_CODE_INCOMPLETE_SIGNATURE,
            Self::InvalidURIPath(_) => ERR_CODE_INVALID_URI_PATH,
            Self::MalformedChunk(_) => ERR_CODE_MALFORMED_CHUNK,
            Self::MalformedHeader(_) => ERR_CODE_MALFORMED_HEADER,
            Self::MalformedQueryString(_) => ERR_CODE_MALFORMED_QUERY_STRING,
            Self::MissingAuthenticationToken(_) => ERR_CODE_MISSING_AUTHENTICATION_TOKEN,
            Self::MissingRequiredHeader(_) => ERR_CODE_MISSING_REQUIRED_HEADER,
            Self::SignatureDoesNotMatch(_) => ERR_CODE_SIGNATURE_DOES_NOT_MATCH,
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            Self::EntityTooLarge(_)
            | Self::IncompleteSignature(_)
            | Self::InvalidURIPath(_)
            | Self::MalformedChunk(_)
            | Self::MalformedHeader(_)
            | Self::MalformedQueryString(_)
            | Self::MissingAuthenticationToken(_)
            | Self::MissingRequiredHeader(_) => StatusCode::BAD_REQUEST,
            Self::IO(_) | Self::InternalServiceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::FORBIDDEN,
        }
    }

    /// Wrap this error in an [`std::io::Error`] of kind `InvalidData` so it can cross a [`std::io::Read`] boundary.
    /// Use [`SignatureError::from_io_error`] to recover it.
    pub fn into_io_error(self) -> IOError {
        match self {
            Self::IO(e) => e,
            e => IOError::new(IOErrorKind::InvalidData, e),
        }
    }

    /// Recover a `SignatureError` from an I/O error produced by a verifying body reader. I/O errors that did not
    /// originate from signature verification become [`SignatureError::IO`].
    pub fn from_io_error(e: IOError) -> Self {
        if e.get_ref().map(|inner| inner.is::<SignatureError>()).unwrap_or(false) {
            match e.into_inner().map(|inner| inner.downcast::<SignatureError>()) {
                Some(Ok(sig_err)) => *sig_err,
                Some(Err(inner)) => Self::InternalServiceError(inner),
                None => Self::InternalServiceError(MSG_CHUNKED_PAYLOAD_REJECTED.into()),
            }
        } else {
            Self::IO(e)
        }
    }
}

impl ServiceError for SignatureError {
    fn error_code(&self) -> &'static str {
        SignatureError::error_code(self)
    }

    fn http_status(&self) -> StatusCode {
        SignatureError::http_status(self)
    }
}

impl Display for SignatureError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::EntityTooLarge(msg) => f.write_str(msg),
            Self::ExpiredToken(msg) => f.write_str(msg),
            Self::IO(ref e) => Display::fmt(e, f),
            Self::InternalServiceError(ref e) => Display::fmt(e, f),
            Self::InvalidClientTokenId(msg) => f.write_str(msg),
            Self::IncompleteSignature(msg) => f.write_str(msg),
            Self::InvalidURIPath(msg) => f.write_str(msg),
            Self::MalformedChunk(msg) => f.write_str(msg),
            Self::MalformedHeader(msg) => f.write_str(msg),
            Self::MalformedQueryString(msg) => f.write_str(msg),
            Self::MissingAuthenticationToken(msg) => f.write_str(msg),
            Self::MissingRequiredHeader(msg) => f.write_str(msg),
            Self::SignatureDoesNotMatch(msg) => {
                if let Some(msg) = msg {
                    f.write_str(msg)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Error for SignatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<IOError> for SignatureError {
    fn from(e: IOError) -> SignatureError {
        SignatureError::from_io_error(e)
    }
}

impl From<Box<dyn Error + Send + Sync>> for SignatureError {
    fn from(e: Box<dyn Error + Send + Sync>) -> SignatureError {
        match e.downcast::<SignatureError>() {
            Ok(sig_err) => *sig_err,
            Err(e) => SignatureError::InternalServiceError(e),
        }
    }
}

/// Error returned by `KSecretKey::from_str` when the secret key has an unusable length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyLengthError {
    /// The key is too long.
    TooLong,
    /// The key is too short.
    TooShort,
}

impl Display for KeyLengthError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            KeyLengthError::TooLong => f.write_str(ERR_MSG_KEY_TOO_LONG),
            KeyLengthError::TooShort => f.write_str(ERR_MSG_KEY_TOO_SHORT),
        }
    }
}

impl Error for KeyLengthError {}

/// Cap a client-supplied value before quoting it in an error message.
pub(crate) fn excerpt(raw: &str) -> Cow<'_, str> {
    match raw.char_indices().nth(MAX_DIAGNOSTIC_LENGTH) {
        None => Cow::Borrowed(raw),
        Some((end, _)) => Cow::Owned(format!("{}...", &raw[..end])),
    }
}
