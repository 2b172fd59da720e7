//! Common constants used throughout the crate.
//!
//! This was consolidated here so the SigV2, SigV4, and chunked-payload code all agree on header names,
//! error codes, and message text. If a value is spelled incorrectly, at least it can be fixed in one spot.
//!
//! Tests that are testing the content of an error code or message should not use these constants;
//! they should use hard-coded strings so the tests are also testing for misspellings.
//!
//! Please keep this file organized alphabetically. (This can be a bit hard with comments, etc.)

/// Default allowed timestamp mismatch in minutes.
pub(crate) const ALLOWED_MISMATCH_MINUTES: i64 = 15;

/// Prefix of a SigV2 `Authorization` header value, including the trailing space.
pub(crate) const AWS_V2_PREFIX: &str = "AWS ";

/// Algorithm for AWS SigV4
pub(crate) const AWS4_HMAC_SHA256: &str = "AWS4-HMAC-SHA256";

/// Algorithm label used in the string to sign for each chunk of a streamed payload.
pub(crate) const AWS4_HMAC_SHA256_PAYLOAD: &str = "AWS4-HMAC-SHA256-PAYLOAD";

/// String included at the end of the AWS SigV4 credential scope
pub(crate) const AWS4_REQUEST: &str = "aws4_request";

/// Prefix prepended to the raw secret key to form the SigV4 `kSecret` HMAC key.
pub(crate) const AWS4_SECRET_PREFIX: &[u8] = b"AWS4";

/// Parameter in a chunk header that carries the chunk signature.
pub(crate) const CHUNK_SIGNATURE: &str = "chunk-signature";

/// Line terminator used throughout the chunked payload framing.
pub(crate) const CRLF: &[u8; 2] = b"\r\n";

/// Authorization header parameter for the access key and scope
pub(crate) const CREDENTIAL: &str = "Credential";

/// Default upper bound on a single declared chunk length (16 MiB).
pub(crate) const DEFAULT_MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Default upper bound on a SigV4 body that is signed as a whole (64 MiB). Such bodies are buffered in memory.
pub(crate) const DEFAULT_MAX_BODY_SIZE: u64 = 64 * 1024 * 1024;

/// Error code: EntityTooLarge
pub(crate) const ERR_CODE_ENTITY_TOO_LARGE: &str = "EntityTooLarge";

/// Error code: ExpiredToken
pub(crate) const ERR_CODE_EXPIRED_TOKEN: &str = "ExpiredToken";

/// Error code: IncompleteSignature
pub(crate) const ERR_CODE_INCOMPLETE_SIGNATURE: &str = "IncompleteSignature";

/// Error code: InternalFailure
pub(crate) const ERR_CODE_INTERNAL_FAILURE: &str = "InternalFailure";

/// Error code: InvalidClientTokenId
pub(crate) const ERR_CODE_INVALID_CLIENT_TOKEN_ID: &str = "InvalidClientTokenId";

/// Error code: InvalidURIPath
pub(crate) const ERR_CODE_INVALID_URI_PATH: &str = "InvalidURIPath";

/// Error code: MalformedChunk (non-AWS standard)
pub(crate) const ERR_CODE_MALFORMED_CHUNK: &str = "MalformedChunk";

/// Error code: MalformedHeader
pub(crate) const ERR_CODE_MALFORMED_HEADER: &str = "MalformedHeader";

/// Error code: MalformedQueryString
pub(crate) const ERR_CODE_MALFORMED_QUERY_STRING: &str = "MalformedQueryString";

/// Error code: MissingAuthenticationToken
pub(crate) const ERR_CODE_MISSING_AUTHENTICATION_TOKEN: &str = "MissingAuthenticationToken";

/// Error code: MissingRequiredHeader
pub(crate) const ERR_CODE_MISSING_REQUIRED_HEADER: &str = "MissingRequiredHeader";

/// Error code: SignatureDoesNotMatch
pub(crate) const ERR_CODE_SIGNATURE_DOES_NOT_MATCH: &str = "SignatureDoesNotMatch";

/// Error message: Key too long
pub(crate) const ERR_MSG_KEY_TOO_LONG: &str = "Key too long";

/// Error message: Key too short
pub(crate) const ERR_MSG_KEY_TOO_SHORT: &str = "Key too short";

/// Header for `authorization`
pub(crate) const HDR_AUTHORIZATION: &str = "authorization";

/// Header for `content-md5`
pub(crate) const HDR_CONTENT_MD5: &str = "content-md5";

/// Header for `content-type`
pub(crate) const HDR_CONTENT_TYPE: &str = "content-type";

/// Header for `date`
pub(crate) const HDR_DATE: &str = "date";

/// Header for `x-amz-content-sha256`
pub(crate) const HDR_X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Header for delivering the alternate date
pub(crate) const HDR_X_AMZ_DATE: &str = "x-amz-date";


/// Header for delivering the session token
pub(crate) const HDR_X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

/// Uppercase hex digits.
pub(crate) const HEX_DIGITS_UPPER: [u8; 16] =
    [b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'A', b'B', b'C', b'D', b'E', b'F'];

/// Compact ISO8601 format used for the string to sign.
pub(crate) const ISO8601_COMPACT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Short date format
pub(crate) const ISO8601_DATE_FORMAT: &str = "%Y%m%d";

/// Length of an ISO8601 date string in the UTC time zone.
pub(crate) const ISO8601_UTC_LENGTH: usize = 16;

/// Upper bound on the length of a raw secret key (without the "AWS4" prefix).
pub(crate) const KSECRETKEY_MAX_LENGTH: usize = 128;

/// Longest chunk header line accepted before a CRLF must appear.
pub(crate) const MAX_CHUNK_HEADER_LENGTH: usize = 1000;

/// Longest excerpt of a client-supplied value quoted back in an error message.
pub(crate) const MAX_DIAGNOSTIC_LENGTH: usize = 256;

/// Error message: `"Authorization header requires 'Credential' parameter."`
pub(crate) const MSG_AUTH_HEADER_REQ_CREDENTIAL: &str = "Authorization header requires 'Credential' parameter.";

/// Error message: `"Authorization header requires existence of either a 'X-Amz-Date' or a 'Date' header."`
pub(crate) const MSG_AUTH_HEADER_REQ_DATE: &str =
    "Authorization header requires existence of either a 'X-Amz-Date' or a 'Date' header.";

/// Error message: `"Authorization header requires 'Signature' parameter."`
pub(crate) const MSG_AUTH_HEADER_REQ_SIGNATURE: &str = "Authorization header requires 'Signature' parameter.";

/// Error message: `"Authorization header requires 'SignedHeaders' parameter."`
pub(crate) const MSG_AUTH_HEADER_REQ_SIGNED_HEADERS: &str = "Authorization header requires 'SignedHeaders' parameter.";

/// Error message: `"The chunked payload ended before the final zero-length chunk."`
pub(crate) const MSG_CHUNKED_PAYLOAD_TRUNCATED: &str = "The chunked payload ended before the final zero-length chunk.";

/// Error message: `"The chunked payload was already rejected."`
pub(crate) const MSG_CHUNKED_PAYLOAD_REJECTED: &str = "The chunked payload was already rejected.";

/// Error message: `"Credential must have exactly 5 slash-delimited elements, e.g. keyid/date/region/service/term,"`
pub(crate) const MSG_CREDENTIAL_MUST_HAVE_FIVE_PARTS: &str =
    "Credential must have exactly 5 slash-delimited elements, e.g. keyid/date/region/service/term,";

/// Error message: `"Illegal hex character in escape % pattern: %"`
pub(crate) const MSG_ILLEGAL_HEX_CHAR: &str = "Illegal hex character in escape % pattern: %";

/// Error message: `"Incomplete trailing escape % sequence"`
pub(crate) const MSG_INCOMPLETE_TRAILING_ESCAPE: &str = "Incomplete trailing escape % sequence";

/// Error message: `"Request is missing Authentication Token"`
pub(crate) const MSG_REQUEST_MISSING_AUTH_TOKEN: &str = "Request is missing Authentication Token";

/// Error message: `"The request signature we calculated does not match the signature you provided. Check your AWS Secret Access Key and signing method. Consult the service documentation for details."`
pub(crate) const MSG_REQUEST_SIGNATURE_MISMATCH: &str = "The request signature we calculated does not match the signature you provided. Check your AWS Secret Access Key and signing method. Consult the service documentation for details.";

/// Error message: `"Unsupported AWS 'algorithm': "`
pub(crate) const MSG_UNSUPPORTED_ALGORITHM: &str = "Unsupported AWS 'algorithm': ";

/// SHA-256 of an empty string.
pub(crate) const SHA256_EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Length of a SHA-256 hex string.
pub(crate) const SHA256_HEX_LENGTH: usize = SHA256_EMPTY.len();

/// The length of a SHA-256 digest in bytes.
pub(crate) const SHA256_OUTPUT_LEN: usize = 32;

/// Authorization header parameter for the signature itself
pub(crate) const SIGNATURE: &str = "Signature";

/// Authorization header parameter specifying the signed headers
pub(crate) const SIGNED_HEADERS: &str = "SignedHeaders";

/// Query parameters that are folded into the SigV2 canonicalized resource.
///
/// This list must stay sorted; the canonicalized resource emits them in this order.
pub(crate) const SIGV2_SUB_RESOURCES: &[&str] = &[
    "acl",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// The region to use for testing.
#[cfg(test)]
pub(crate) const TEST_REGION: &str = "us-east-1";

/// The service to use for testing.
#[cfg(test)]
pub(crate) const TEST_SERVICE: &str = "s3";

/// Token used for `x-amz-content-sha256` when the payload is streamed and SigV4 signed
pub(crate) const XACS_STREAMING_AWS4_HMAC_SHA256_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";
