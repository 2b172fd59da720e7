use {
    crate::constants::SHA256_OUTPUT_LEN,
    hmac::{Hmac, Mac},
    sha1::Sha1,
    sha2::{Digest, Sha256},
};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA1 tag in bytes.
pub(crate) const SHA1_OUTPUT_LEN: usize = 20;

/// HMAC-SHA256 of `value` under `key`.
#[inline(always)]
pub(crate) fn hmac_sha256(key: &[u8], value: &[u8]) -> [u8; SHA256_OUTPUT_LEN] {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts any key length");
    mac.update(value);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA1 of `value` under `key`. Only used by SigV2.
#[inline(always)]
pub(crate) fn hmac_sha1(key: &[u8], value: &[u8]) -> [u8; SHA1_OUTPUT_LEN] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC-SHA1 accepts any key length");
    mac.update(value);
    mac.finalize().into_bytes().into()
}

#[inline(always)]
pub(crate) fn sha256(value: &[u8]) -> [u8; SHA256_OUTPUT_LEN] {
    Sha256::digest(value).into()
}

#[inline(always)]
pub(crate) fn sha256_hex(value: &[u8]) -> String {
    hex::encode(sha256(value))
}
