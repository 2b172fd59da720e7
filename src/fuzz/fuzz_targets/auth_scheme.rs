#![no_main]
use {
    http::{HeaderMap, HeaderValue},
    libfuzzer_sys::fuzz_target,
    s3_request_auth::AuthScheme,
};

fuzz_target!(|data: (Vec<u8>, Vec<u8>)| {
    let (authorization, content_sha256) = data;
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_bytes(&authorization) {
        headers.insert("authorization", value);
    }

    if let Ok(value) = HeaderValue::from_bytes(&content_sha256) {
        headers.insert("x-amz-content-sha256", value);
    }

    if let Ok(scheme) = AuthScheme::from_headers(&headers) {
        let _ = scheme.kind();
    }
});
