use {
    crate::{constants::*, crypto::hmac_sha256, KeyLengthError, ScopeInfo},
    derive_builder::Builder,
    scratchstack_aws_principal::{Principal, SessionData},
    std::{
        fmt::{Debug, Display, Formatter, Result as FmtResult},
        future::Future,
        str::FromStr,
    },
    subtle::ConstantTimeEq,
    tower::{service_fn, util::ServiceFn, BoxError},
};

/// A raw AWS secret key (`kSecret`).
///
/// SigV4 keys its first HMAC with the secret prefixed by `AWS4`; SigV2 uses the secret as-is. Both views are
/// available from the same value.
#[derive(Clone)]
pub struct KSecretKey {
    /// The secret key, prefixed with "AWS4".
    prefixed_key: Vec<u8>,
}

/// The `kDate` key: `HMAC_SHA256("AWS4" + KSecretKey, "YYYYMMDD")`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KDateKey {
    /// The raw key.
    key: [u8; SHA256_OUTPUT_LEN],
}

/// The `kRegion` key: an AWS `kDate` key, HMAC-SHA256 hashed with the region.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KRegionKey {
    /// The raw key.
    key: [u8; SHA256_OUTPUT_LEN],
}

/// The `kService` key: an AWS `kRegion` key, HMAC-SHA256 hashed with the service.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KServiceKey {
    /// The raw key.
    key: [u8; SHA256_OUTPUT_LEN],
}

/// The `kSigning` key: an AWS `kService` key, HMAC-SHA256 hashed with the "aws4_request" string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KSigningKey {
    /// The resulting raw signing key.
    key: [u8; SHA256_OUTPUT_LEN],
}

impl AsRef<[u8]> for KSecretKey {
    fn as_ref(&self) -> &[u8] {
        // Remove the "AWS4" prefix.
        &self.prefixed_key[AWS4_SECRET_PREFIX.len()..]
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KDateKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KRegionKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KServiceKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl AsRef<[u8; SHA256_OUTPUT_LEN]> for KSigningKey {
    fn as_ref(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.key
    }
}

impl PartialEq for KSecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.prefixed_key.ct_eq(&other.prefixed_key).into()
    }
}

impl Eq for KSecretKey {}

/// Key material never appears in `Debug` or `Display` output; only the type name is printed.
macro_rules! opaque_key_fmt {
    ($($key_type:ident),*) => {
        $(
            impl Debug for $key_type {
                fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                    f.write_str(stringify!($key_type))
                }
            }

            impl Display for $key_type {
                fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                    f.write_str(stringify!($key_type))
                }
            }
        )*
    };
}

opaque_key_fmt!(KSecretKey, KDateKey, KRegionKey, KServiceKey, KSigningKey);

impl FromStr for KSecretKey {
    type Err = KeyLengthError;

    /// Create a new `KSecretKey` from a raw AWS secret key.
    fn from_str(raw: &str) -> Result<Self, KeyLengthError> {
        if raw.is_empty() {
            return Err(KeyLengthError::TooShort);
        }

        if raw.len() > KSECRETKEY_MAX_LENGTH {
            return Err(KeyLengthError::TooLong);
        }

        let mut prefixed_key = Vec::with_capacity(AWS4_SECRET_PREFIX.len() + raw.len());
        prefixed_key.extend_from_slice(AWS4_SECRET_PREFIX);
        prefixed_key.extend_from_slice(raw.as_bytes());
        Ok(Self {
            prefixed_key,
        })
    }
}

impl KSecretKey {
    /// Create a new `KDateKey` from this `KSecretKey` and a `YYYYMMDD` date stamp.
    pub fn to_kdate(&self, date_stamp: &str) -> KDateKey {
        KDateKey {
            key: hmac_sha256(self.prefixed_key.as_slice(), date_stamp.as_bytes()),
        }
    }

    /// Create a new `KRegionKey` from this `KSecretKey`, a date stamp, and a region.
    pub fn to_kregion(&self, date_stamp: &str, region: &str) -> KRegionKey {
        self.to_kdate(date_stamp).to_kregion(region)
    }

    /// Create a new `KServiceKey` from this `KSecretKey`, a date stamp, a region, and a service.
    pub fn to_kservice(&self, date_stamp: &str, region: &str, service: &str) -> KServiceKey {
        self.to_kdate(date_stamp).to_kservice(region, service)
    }

    /// Create a new `KSigningKey` from this `KSecretKey`, a date stamp, a region, and a service.
    pub fn to_ksigning(&self, date_stamp: &str, region: &str, service: &str) -> KSigningKey {
        self.to_kdate(date_stamp).to_ksigning(region, service)
    }

    /// Create the `KSigningKey` bound to a credential scope.
    pub fn to_ksigning_for_scope(&self, scope: &ScopeInfo) -> KSigningKey {
        self.to_ksigning(scope.date_stamp(), scope.region(), scope.service())
    }
}

impl KDateKey {
    /// Create a new `KRegionKey` from this `KDateKey` and a region.
    pub fn to_kregion(&self, region: &str) -> KRegionKey {
        KRegionKey {
            key: hmac_sha256(self.key.as_slice(), region.as_bytes()),
        }
    }

    /// Create a new `KServiceKey` from this `KDateKey`, a region, and a service.
    pub fn to_kservice(&self, region: &str, service: &str) -> KServiceKey {
        self.to_kregion(region).to_kservice(service)
    }

    /// Create a new `KSigningKey` from this `KDateKey`, a region, and a service.
    pub fn to_ksigning(&self, region: &str, service: &str) -> KSigningKey {
        self.to_kregion(region).to_ksigning(service)
    }
}

impl KRegionKey {
    /// Create a new `KServiceKey` from this `KRegionKey` and a service.
    pub fn to_kservice(&self, service: &str) -> KServiceKey {
        KServiceKey {
            key: hmac_sha256(self.key.as_slice(), service.as_bytes()),
        }
    }

    /// Create a new `KSigningKey` from this `KRegionKey` and a service.
    pub fn to_ksigning(&self, service: &str) -> KSigningKey {
        self.to_kservice(service).to_ksigning()
    }
}

impl KServiceKey {
    /// Create a new `KSigningKey` from this `KServiceKey`.
    pub fn to_ksigning(&self) -> KSigningKey {
        KSigningKey {
            key: hmac_sha256(self.key.as_slice(), AWS4_REQUEST.as_bytes()),
        }
    }
}

impl KSigningKey {
    /// Sign a string to sign, producing the raw 32-byte SigV4 signature.
    pub fn sign(&self, string_to_sign: &[u8]) -> [u8; SHA256_OUTPUT_LEN] {
        hmac_sha256(self.key.as_slice(), string_to_sign)
    }
}

/// A request for the secret key associated with an access key.
///
/// GetSecretKeyRequest structs are immutable. Use [`GetSecretKeyRequestBuilder`] to programmatically construct a
/// request.
#[derive(Builder, Clone, Debug)]
#[non_exhaustive]
pub struct GetSecretKeyRequest {
    /// The access key used in the request.
    #[builder(setter(into))]
    access_key: String,

    /// The session token provided in the request, if any.
    #[builder(setter(into), default)]
    session_token: Option<String>,
}

impl GetSecretKeyRequest {
    /// Create a [GetSecretKeyRequestBuilder] to construct a [GetSecretKeyRequest].
    #[inline]
    pub fn builder() -> GetSecretKeyRequestBuilder {
        GetSecretKeyRequestBuilder::default()
    }

    /// Retrieve the access key used in the request.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Retrieve the session token provided in the request, if any.
    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

/// A response from the secret key provider.
///
/// GetSecretKeyResponse structs are immutable. Use [GetSecretKeyResponseBuilder] to programmatically construct a
/// response.
#[derive(Builder, Clone, Debug)]
pub struct GetSecretKeyResponse {
    /// The principal actors of the request.
    #[builder(setter(into), default)]
    pub(crate) principal: Principal,

    /// The session data associated with the principal.
    #[builder(setter(into), default)]
    pub(crate) session_data: SessionData,

    /// The secret key. Only the SigV4 signing key derived from it for the request's scope is used for SigV4; SigV2
    /// uses it directly.
    pub(crate) secret_key: KSecretKey,
}

impl GetSecretKeyResponse {
    /// Create a [GetSecretKeyResponseBuilder] to construct a [GetSecretKeyResponse].
    #[inline]
    pub fn builder() -> GetSecretKeyResponseBuilder {
        GetSecretKeyResponseBuilder::default()
    }

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

    /// Retrieve the secret key.
    #[inline]
    pub fn secret_key(&self) -> &KSecretKey {
        &self.secret_key
    }
}

// The bound every secret-key lookup service has to satisfy. This would be a trait alias once that feature is
// stabilized (https://github.com/rust-lang/rust/issues/41517); until then the bounds are repeated where needed.
//
// pub trait GetSecretKey<F> = Service<GetSecretKeyRequest, Response = GetSecretKeyResponse, Error = BoxError, Future = F> + Send;

/// Create a Service that wraps a function that can produce a secret key.
pub fn service_for_secret_key_fn<F, Fut>(f: F) -> ServiceFn<F>
where
    F: FnMut(GetSecretKeyRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<GetSecretKeyResponse, BoxError>> + Send + 'static,
{
    service_fn(f)
}

#[cfg(test)]
mod tests {
    use {
        crate::{GetSecretKeyRequest, GetSecretKeyResponse, KSecretKey, KeyLengthError, ScopeInfo},
        scratchstack_aws_principal::{AssumedRole, Principal},
        std::str::FromStr,
    };

    #[test_log::test]
    fn test_signing_key_derived() {
        let date = "20150830";

        let ksecret1a = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY").unwrap();
        let ksecret1b = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY").unwrap();
        let ksecret2 = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG+bPxRfiCZEXAMPLEKEY").unwrap();

        assert_eq!(ksecret1a, ksecret1b);
        assert_eq!(ksecret1a, ksecret1a.clone());
        assert_ne!(ksecret1a, ksecret2);
        assert_eq!(format!("{:?}", ksecret1a).as_str(), "KSecretKey");
        assert_eq!(format!("{}", ksecret1a).as_str(), "KSecretKey");
        assert_eq!(ksecret1a.as_ref(), b"wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY");

        let kdate1a = ksecret1a.to_kdate(date);
        let kdate2 = ksecret2.to_kdate(date);
        assert_eq!(
            kdate1a.as_ref(),
            &[
                0x01u8, 0x38u8, 0xc7u8, 0xa6u8, 0xcbu8, 0xd6u8, 0x0au8, 0xa7u8, 0x27u8, 0xb2u8, 0xf6u8, 0x53u8, 0xa5u8,
                0x22u8, 0x56u8, 0x74u8, 0x39u8, 0xdfu8, 0xb9u8, 0xf3u8, 0xe7u8, 0x2bu8, 0x21u8, 0xf9u8, 0xb2u8, 0x59u8,
                0x41u8, 0xa4u8, 0x2fu8, 0x04u8, 0xa7u8, 0xcdu8
            ]
        );
        assert_ne!(kdate1a, kdate2);
        assert_eq!(format!("{:?}", kdate1a).as_str(), "KDateKey");

        let kregion1a = kdate1a.to_kregion("us-east-1");
        assert_eq!(
            kregion1a.as_ref(),
            &[
                0xf3u8, 0x3du8, 0x58u8, 0x08u8, 0x50u8, 0x4bu8, 0xf3u8, 0x48u8, 0x12u8, 0xe5u8, 0xfau8, 0xdeu8, 0x63u8,
                0x30u8, 0x8bu8, 0x42u8, 0x4bu8, 0x24u8, 0x4cu8, 0x59u8, 0x18u8, 0x9bu8, 0xe2u8, 0xa5u8, 0x91u8, 0xddu8,
                0x22u8, 0x82u8, 0xc7u8, 0xcbu8, 0x56u8, 0x3fu8
            ]
        );
        assert_eq!(format!("{}", kregion1a).as_str(), "KRegionKey");

        let kservice1a = kregion1a.to_kservice("example");
        assert_eq!(
            kservice1a.as_ref(),
            &[
                0xc6u8, 0x0cu8, 0xc4u8, 0xb1u8, 0xd0u8, 0x34u8, 0xc7u8, 0x57u8, 0x34u8, 0x8fu8, 0x2cu8, 0x67u8, 0x30u8,
                0x04u8, 0xc1u8, 0x89u8, 0x08u8, 0xbbu8, 0xa9u8, 0xa4u8, 0x6fu8, 0xa1u8, 0xdbu8, 0x87u8, 0xa9u8, 0x83u8,
                0x50u8, 0xf2u8, 0x7eu8, 0x7bu8, 0x2du8, 0xf6u8
            ]
        );
        assert_eq!(format!("{:?}", kservice1a).as_str(), "KServiceKey");

        let ksigning1a = kservice1a.to_ksigning();
        assert_eq!(
            ksigning1a.as_ref(),
            &[
                0x43u8, 0x1cu8, 0xc9u8, 0xefu8, 0x58u8, 0x76u8, 0x28u8, 0x7du8, 0xbbu8, 0x92u8, 0x5du8, 0x4bu8, 0xa4u8,
                0x62u8, 0x9fu8, 0x45u8, 0x90u8, 0x02u8, 0xadu8, 0x1du8, 0x26u8, 0xb7u8, 0xc7u8, 0x51u8, 0x60u8, 0x1bu8,
                0xb2u8, 0x04u8, 0xe1u8, 0x17u8, 0x18u8, 0xb8u8
            ]
        );
        assert_eq!(format!("{}", ksigning1a).as_str(), "KSigningKey");

        assert_eq!(ksecret1a.to_kregion(date, "us-east-1"), kregion1a);
        assert_eq!(ksecret1a.to_kservice(date, "us-east-1", "example"), kservice1a);
        assert_eq!(ksecret1a.to_ksigning(date, "us-east-1", "example"), ksigning1a);
        assert_eq!(kdate1a.to_kservice("us-east-1", "example"), kservice1a);
        assert_eq!(kdate1a.to_ksigning("us-east-1", "example"), ksigning1a);
        assert_eq!(
            ksecret1a.to_ksigning_for_scope(&ScopeInfo::new("20150830", "us-east-1", "example")),
            ksigning1a
        );
        assert_ne!(ksecret2.to_ksigning(date, "us-east-1", "example"), ksigning1a);
    }

    #[test_log::test]
    fn test_chunked_upload_signing_key() {
        // The S3 chunked upload documentation example: signing the seed string to sign yields the seed signature.
        let secret = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY").unwrap();
        let signing_key = secret.to_ksigning("20130524", "us-east-1", "s3");
        let string_to_sign = "AWS4-HMAC-SHA256\n20130524T000000Z\n20130524/us-east-1/s3/aws4_request\n\
                              cee3fed04b70f867d036f722359b0b1f2f0e5dc0efadbc082b76c4c60e316455";
        assert_eq!(
            hex::encode(signing_key.sign(string_to_sign.as_bytes())),
            "4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9"
        );
    }

    #[test_log::test]
    fn test_gsk_derived() {
        let gsk_req1a = GetSecretKeyRequest::builder()
            .access_key("AKIDEXAMPLE")
            .session_token(Some("token".to_string()))
            .build()
            .unwrap();

        // Make sure we can debug print the request.
        let _ = format!("{:?}", gsk_req1a);

        let gsk_req1b = gsk_req1a.clone();
        assert_eq!(gsk_req1a.access_key(), gsk_req1b.access_key());
        assert_eq!(gsk_req1b.session_token(), Some("token"));

        let secret_key = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY").unwrap();
        let principal = Principal::from(AssumedRole::new("aws", "123456789012", "role", "session").unwrap());

        let gsk_resp1a =
            GetSecretKeyResponse::builder().secret_key(secret_key).principal(principal).build().unwrap();

        // The secret never leaks through Debug.
        let debug = format!("{:?}", gsk_resp1a);
        assert!(!debug.contains("EXAMPLEKEY"));

        let gsk_resp1b = gsk_resp1a.clone();
        assert_eq!(gsk_resp1a.secret_key(), gsk_resp1b.secret_key());
        assert_eq!(gsk_resp1a.principal(), gsk_resp1b.principal());
    }

    #[test_log::test]
    fn test_response_builder() {
        let secret_key = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY").unwrap();
        let response = GetSecretKeyResponse::builder().secret_key(secret_key).build().unwrap();
        assert!(response.principal().is_empty());
        assert!(response.session_data().is_empty());

        assert!(GetSecretKeyResponse::builder().build().is_err());
    }

    #[test]
    fn test_key_from_str_length() {
        assert_eq!(KSecretKey::from_str(""), Err(KeyLengthError::TooShort));
        assert_eq!(KSecretKey::from_str(&"x".repeat(129)), Err(KeyLengthError::TooLong));
        assert!(KSecretKey::from_str("123").is_ok());
        assert!(KSecretKey::from_str(&"x".repeat(128)).is_ok());
    }
}
