#![no_main]
use {
    arbitrary::Arbitrary,
    bytes::BytesMut,
    chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc},
    libfuzzer_sys::fuzz_target,
    s3_request_auth::{ChunkSignatureSequence, ChunkSigningContext, KSecretKey, ScopeInfo},
    std::str::FromStr,
};

#[derive(Arbitrary, Debug)]
struct ChunkInput {
    body: Vec<u8>,
    splits: Vec<u16>,
    max_chunk_size: u16,
}

fuzz_target!(|data: ChunkInput| {
    let timestamp = DateTime::<Utc>::from_naive_utc_and_offset(
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2013, 5, 24).unwrap(), NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
        Utc,
    );
    let signing_key = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY")
        .unwrap()
        .to_ksigning("20130524", "us-east-1", "s3");
    let context = ChunkSigningContext::new(signing_key, timestamp, &ScopeInfo::new("20130524", "us-east-1", "s3"));
    let mut sequence = ChunkSignatureSequence::new(context, [0u8; 32], data.max_chunk_size as u64);
    let mut output = BytesMut::new();

    let mut rest = &data.body[..];
    for split in data.splits {
        let n = (split as usize).min(rest.len());
        let (piece, remaining) = rest.split_at(n);
        if sequence.feed(piece, &mut output).is_err() {
            return;
        }
        rest = remaining;
    }

    if sequence.feed(rest, &mut output).is_ok() {
        let _ = sequence.finish();
    }
});
