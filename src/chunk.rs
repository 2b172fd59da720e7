//! Verification of SigV4 streamed chunked uploads (`STREAMING-AWS4-HMAC-SHA256-PAYLOAD`).
//!
//! The body of such a request is a sequence of chunks:
//!
//! ```text
//! <hex-length>;chunk-signature=<64-hex-signature>\r\n
//! <length bytes>\r\n
//! ...
//! 0;chunk-signature=<64-hex-signature>\r\n
//! \r\n
//! ```
//!
//! Each chunk signature covers the previous signature (starting with the seed signature from the `Authorization`
//! header) and the SHA-256 digest of the chunk payload. [ChunkState] is the resumable decoder for a single chunk;
//! [ChunkSignatureSequence] drives it across the whole body and releases payload bytes only after the chunk they
//! belong to has been verified. [AwsChunkedReader] wraps the sequence as a [std::io::Read].

use {
    crate::{constants::*, crypto::sha256, error::excerpt, KSigningKey, ScopeInfo, SignatureError},
    bytes::{Buf, Bytes, BytesMut},
    chrono::{DateTime, Utc},
    log::{debug, trace},
    sha2::{Digest, Sha256},
    std::{
        cmp::min,
        fmt::{Debug, Formatter, Result as FmtResult},
        io::{Read, Result as IOResult},
        ops::Range,
        str::{from_utf8, FromStr},
    },
    subtle::ConstantTimeEq,
};

const READ_BUFFER_SIZE: usize = 8192;

/// The header line of a chunk: `<hex-length>;chunk-signature=<64-hex-signature>`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkHeader {
    length: u64,
    signature: [u8; SHA256_OUTPUT_LEN],
}

impl ChunkHeader {
    /// Create a new chunk header.
    pub fn new(length: u64, signature: [u8; SHA256_OUTPUT_LEN]) -> Self {
        Self {
            length,
            signature,
        }
    }

    /// The declared length of the chunk payload.
    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The declared signature of the chunk.
    #[inline]
    pub fn signature(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.signature
    }
}

impl FromStr for ChunkHeader {
    type Err = SignatureError;

    /// Parse a chunk header line with the trailing CRLF already removed.
    fn from_str(line: &str) -> Result<Self, SignatureError> {
        let malformed = |detail: &str| {
            SignatureError::MalformedChunk(format!("Invalid chunk header: {}: '{}'", detail, excerpt(line)))
        };

        let mut parts = line.split(';');
        let (Some(size), Some(extension), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed("expected exactly one chunk extension"));
        };

        if size.is_empty() || !size.bytes().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed("chunk size must be a hexadecimal number"));
        }

        let length = u64::from_str_radix(size, 16).map_err(|_| malformed("chunk size is too large"))?;

        let Some(signature_hex) = extension.strip_prefix(CHUNK_SIGNATURE).and_then(|s| s.strip_prefix('=')) else {
            return Err(malformed("expected chunk-signature extension"));
        };

        let mut signature = [0u8; SHA256_OUTPUT_LEN];
        hex::decode_to_slice(signature_hex, &mut signature)
            .map_err(|_| malformed("chunk signature must be 64 hexadecimal characters"))?;

        Ok(Self {
            length,
            signature,
        })
    }
}

/// A chunk that has been fully read but not yet verified.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CompletedChunk {
    header: ChunkHeader,
    payload_sha256: [u8; SHA256_OUTPUT_LEN],
}

impl CompletedChunk {
    /// The header of the chunk.
    #[inline]
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// The signature the client declared for this chunk.
    #[inline]
    pub fn signature(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        self.header.signature()
    }

    /// The SHA-256 digest of the chunk payload.
    #[inline]
    pub fn payload_sha256(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.payload_sha256
    }

    /// Indicates whether this is the zero-length chunk that terminates the stream.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.header.length() == 0
    }
}

/// The decoder state for a single chunk.
///
/// A state is consumed by [advance][ChunkState::advance] and a new one is returned, so decoding can be resumed
/// across any number of input buffers.
#[derive(Clone)]
pub enum ChunkState {
    /// Accumulating the header line until CRLF.
    ReadingHeader {
        /// Bytes of the header line seen so far, including any partial CRLF.
        line: Vec<u8>,
    },

    /// Consuming the declared number of payload bytes.
    ReadingPayload {
        /// The parsed header.
        header: ChunkHeader,

        /// Payload bytes not yet seen.
        remaining: u64,

        /// Running digest of the payload.
        hasher: Sha256,
    },

    /// Consuming the CRLF after the payload.
    ReadingTrailer {
        /// The parsed header.
        header: ChunkHeader,

        /// Digest of the complete payload.
        payload_sha256: [u8; SHA256_OUTPUT_LEN],

        /// Number of trailer bytes seen so far.
        seen: usize,
    },

    /// The chunk has been read completely.
    Complete(CompletedChunk),
}

/// The result of a call to [ChunkState::advance].
#[derive(Debug)]
pub struct ChunkStep {
    /// The new decoder state.
    pub state: ChunkState,

    /// The number of input bytes consumed.
    pub consumed: usize,

    /// The range of the input holding payload bytes for the current chunk. May be empty.
    pub payload: Range<usize>,
}

impl ChunkState {
    /// The initial state for a chunk.
    pub fn new() -> Self {
        Self::ReadingHeader {
            line: Vec::new(),
        }
    }

    /// Indicates whether the chunk has been read completely.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Consume as much of `input` as belongs to the current chunk.
    ///
    /// Processing stops at the end of the input or once the chunk is complete; bytes past the end of the chunk are
    /// not consumed. Chunks declaring a length above `max_chunk_size` are rejected once the header is read.
    pub fn advance(self, input: &[u8], max_chunk_size: u64) -> Result<ChunkStep, SignatureError> {
        let mut pos = 0;
        let mut payload = 0..0;
        let mut state = self;

        loop {
            state = match state {
                complete @ Self::Complete(_) => {
                    return Ok(ChunkStep {
                        state: complete,
                        consumed: pos,
                        payload,
                    })
                }

                Self::ReadingHeader {
                    mut line,
                } => {
                    let mut terminated = false;

                    while pos < input.len() {
                        line.push(input[pos]);
                        pos += 1;

                        if line.ends_with(CRLF) {
                            terminated = true;
                            break;
                        }

                        // A trailing CR may still be the start of the line terminator.
                        let content_len = if line.last() == Some(&b'\r') {
                            line.len() - 1
                        } else {
                            line.len()
                        };

                        if content_len > MAX_CHUNK_HEADER_LENGTH {
                            return Err(SignatureError::MalformedChunk(format!(
                                "Chunk header exceeds {} bytes without a line terminator",
                                MAX_CHUNK_HEADER_LENGTH
                            )));
                        }
                    }

                    if !terminated {
                        return Ok(ChunkStep {
                            state: Self::ReadingHeader {
                                line,
                            },
                            consumed: pos,
                            payload,
                        });
                    }

                    line.truncate(line.len() - CRLF.len());
                    let line = from_utf8(&line).map_err(|_| {
                        SignatureError::MalformedChunk("Chunk header is not valid UTF-8".to_string())
                    })?;
                    let header = ChunkHeader::from_str(line)?;

                    if header.length() > max_chunk_size {
                        return Err(SignatureError::MalformedChunk(format!(
                            "Chunk length {} exceeds the maximum of {} bytes",
                            header.length(),
                            max_chunk_size
                        )));
                    }

                    trace!("chunk header: length={} signature={}", header.length(), hex::encode(header.signature()));
                    Self::ReadingPayload {
                        header,
                        remaining: header.length(),
                        hasher: Sha256::new(),
                    }
                }

                Self::ReadingPayload {
                    header,
                    mut remaining,
                    mut hasher,
                } => {
                    let available = (input.len() - pos) as u64;
                    let take = min(remaining, available) as usize;
                    hasher.update(&input[pos..pos + take]);
                    payload = pos..pos + take;
                    pos += take;
                    remaining -= take as u64;

                    if remaining > 0 {
                        return Ok(ChunkStep {
                            state: Self::ReadingPayload {
                                header,
                                remaining,
                                hasher,
                            },
                            consumed: pos,
                            payload,
                        });
                    }

                    Self::ReadingTrailer {
                        header,
                        payload_sha256: hasher.finalize().into(),
                        seen: 0,
                    }
                }

                Self::ReadingTrailer {
                    header,
                    payload_sha256,
                    mut seen,
                } => {
                    while seen < CRLF.len() && pos < input.len() {
                        if input[pos] != CRLF[seen] {
                            return Err(SignatureError::MalformedChunk(
                                "Chunk payload is not followed by CRLF".to_string(),
                            ));
                        }
                        seen += 1;
                        pos += 1;
                    }

                    if seen < CRLF.len() {
                        return Ok(ChunkStep {
                            state: Self::ReadingTrailer {
                                header,
                                payload_sha256,
                                seen,
                            },
                            consumed: pos,
                            payload,
                        });
                    }

                    Self::Complete(CompletedChunk {
                        header,
                        payload_sha256,
                    })
                }
            }
        }
    }
}

impl Default for ChunkState {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ChunkState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::ReadingHeader {
                line,
            } => f.debug_struct("ReadingHeader").field("line_len", &line.len()).finish(),
            Self::ReadingPayload {
                header,
                remaining,
                ..
            } => f.debug_struct("ReadingPayload").field("header", header).field("remaining", remaining).finish(),
            Self::ReadingTrailer {
                header,
                seen,
                ..
            } => f.debug_struct("ReadingTrailer").field("header", header).field("seen", seen).finish(),
            Self::Complete(chunk) => f.debug_tuple("Complete").field(chunk).finish(),
        }
    }
}

/// The request-scoped values needed to compute chunk signatures.
#[derive(Clone, Debug)]
pub struct ChunkSigningContext {
    signing_key: KSigningKey,
    timestamp: String,
    scope: String,
}

impl ChunkSigningContext {
    /// Create a signing context from the request's signing key, timestamp, and credential scope.
    pub fn new(signing_key: KSigningKey, timestamp: DateTime<Utc>, scope: &ScopeInfo) -> Self {
        Self {
            signing_key,
            timestamp: timestamp.format(ISO8601_COMPACT_FORMAT).to_string(),
            scope: scope.to_string(),
        }
    }

    /// Return the string to sign for a chunk:
    /// `AWS4-HMAC-SHA256-PAYLOAD\n<timestamp>\n<scope>\n<prior signature>\n<SHA-256 of "">\n<SHA-256 of payload>`.
    pub fn string_to_sign(
        &self,
        prior_signature: &[u8; SHA256_OUTPUT_LEN],
        payload_sha256: &[u8; SHA256_OUTPUT_LEN],
    ) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            AWS4_HMAC_SHA256_PAYLOAD,
            self.timestamp,
            self.scope,
            hex::encode(prior_signature),
            SHA256_EMPTY,
            hex::encode(payload_sha256)
        )
        .into_bytes()
    }

    /// Compute the signature of a chunk.
    pub fn sign(
        &self,
        prior_signature: &[u8; SHA256_OUTPUT_LEN],
        payload_sha256: &[u8; SHA256_OUTPUT_LEN],
    ) -> [u8; SHA256_OUTPUT_LEN] {
        self.signing_key.sign(&self.string_to_sign(prior_signature, payload_sha256))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SequenceStatus {
    Streaming,
    Finished,
    Failed,
}

/// Verifies the signature chain of a chunked body, releasing payload bytes as each chunk is verified.
///
/// Payload bytes are held back until the signature of the chunk they belong to checks out. A chunk that fails
/// verification releases nothing, and the sequence refuses all further input.
#[derive(Debug)]
pub struct ChunkSignatureSequence {
    context: ChunkSigningContext,
    prior_signature: [u8; SHA256_OUTPUT_LEN],
    state: ChunkState,
    pending: BytesMut,
    max_chunk_size: u64,
    chunks_verified: u64,
    status: SequenceStatus,
}

impl ChunkSignatureSequence {
    /// Create a sequence seeded with the signature from the request's `Authorization` header.
    pub fn new(context: ChunkSigningContext, seed_signature: [u8; SHA256_OUTPUT_LEN], max_chunk_size: u64) -> Self {
        Self {
            context,
            prior_signature: seed_signature,
            state: ChunkState::new(),
            pending: BytesMut::new(),
            max_chunk_size,
            chunks_verified: 0,
            status: SequenceStatus::Streaming,
        }
    }

    /// The signature of the last verified chunk, or the seed signature if none have been verified.
    #[inline]
    pub fn prior_signature(&self) -> &[u8; SHA256_OUTPUT_LEN] {
        &self.prior_signature
    }

    /// Indicates whether the terminating chunk has been verified.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status == SequenceStatus::Finished
    }

    /// Feed body bytes into the sequence. Verified payload bytes are appended to `output`; the number appended is
    /// returned.
    ///
    /// A single call may verify several chunks. If a later chunk fails, the payload of the chunks verified before it
    /// has already been appended to `output` and stays valid; only the error is returned, so callers that need the
    /// count should compare the length of `output` before and after the call.
    ///
    /// Once an error has been returned, every subsequent call fails.
    pub fn feed(&mut self, input: &[u8], output: &mut BytesMut) -> Result<usize, SignatureError> {
        let result = self.feed_inner(input, output);
        if result.is_err() {
            self.status = SequenceStatus::Failed;
            self.pending.clear();
        }
        result
    }

    fn feed_inner(&mut self, input: &[u8], output: &mut BytesMut) -> Result<usize, SignatureError> {
        let mut pos = 0;
        let mut released = 0;

        loop {
            match self.status {
                SequenceStatus::Failed => {
                    return Err(SignatureError::MalformedChunk(MSG_CHUNKED_PAYLOAD_REJECTED.to_string()))
                }
                SequenceStatus::Finished => {
                    if pos < input.len() {
                        return Err(SignatureError::MalformedChunk(
                            "Unexpected data after the final chunk".to_string(),
                        ));
                    }
                    return Ok(released);
                }
                SequenceStatus::Streaming => (),
            }

            if pos == input.len() {
                return Ok(released);
            }

            let state = std::mem::take(&mut self.state);
            let step = state.advance(&input[pos..], self.max_chunk_size)?;
            self.pending.extend_from_slice(&input[pos + step.payload.start..pos + step.payload.end]);
            pos += step.consumed;

            match step.state {
                ChunkState::Complete(chunk) => {
                    released += self.verify_chunk(&chunk, output)?;
                }
                other => self.state = other,
            }
        }
    }

    fn verify_chunk(&mut self, chunk: &CompletedChunk, output: &mut BytesMut) -> Result<usize, SignatureError> {
        let expected = self.context.sign(&self.prior_signature, chunk.payload_sha256());
        let is_equal: bool = expected.ct_eq(chunk.signature()).into();

        // Chunks are numbered from 1.
        let chunk_number = self.chunks_verified + 1;

        if !is_equal {
            debug!(
                "chunk {}: signature mismatch: expected {}, got {}",
                chunk_number,
                hex::encode(expected),
                hex::encode(chunk.signature())
            );
            return Err(SignatureError::SignatureDoesNotMatch(Some(format!(
                "The chunk signature we calculated does not match the signature you provided for chunk {}.",
                chunk_number
            ))));
        }

        trace!("chunk {}: verified {} bytes", chunk_number, self.pending.len());
        self.prior_signature = expected;
        self.chunks_verified += 1;

        let released = self.pending.len();
        output.extend_from_slice(&self.pending);
        self.pending.clear();

        if chunk.is_final() {
            debug!("chunked payload verified: {} chunks", self.chunks_verified);
            self.status = SequenceStatus::Finished;
        }

        Ok(released)
    }

    /// Signal the end of the body. Fails unless the terminating chunk has been verified.
    pub fn finish(&mut self) -> Result<(), SignatureError> {
        match self.status {
            SequenceStatus::Finished => Ok(()),
            SequenceStatus::Failed => Err(SignatureError::MalformedChunk(MSG_CHUNKED_PAYLOAD_REJECTED.to_string())),
            SequenceStatus::Streaming => {
                debug!("chunked payload ended after {} chunks without a final chunk", self.chunks_verified);
                self.status = SequenceStatus::Failed;
                self.pending.clear();
                Err(SignatureError::MalformedChunk(MSG_CHUNKED_PAYLOAD_TRUNCATED.to_string()))
            }
        }
    }
}

/// A reader over a chunked body that yields only verified payload bytes.
///
/// Verification failures are reported as [std::io::Error]s of kind [InvalidData][std::io::ErrorKind::InvalidData]
/// wrapping the [SignatureError]; use [SignatureError::from_io_error] to recover it.
pub struct AwsChunkedReader<R> {
    inner: R,
    sequence: ChunkSignatureSequence,
    verified: BytesMut,
    read_buffer: Vec<u8>,

    /// A failure raised while verified bytes were still buffered. Reported once those bytes have been read.
    deferred_error: Option<SignatureError>,
}

impl<R> AwsChunkedReader<R> {
    /// Wrap a raw chunked body.
    pub fn new(inner: R, sequence: ChunkSignatureSequence) -> Self {
        Self {
            inner,
            sequence,
            verified: BytesMut::new(),
            read_buffer: vec![0; READ_BUFFER_SIZE],
            deferred_error: None,
        }
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the underlying reader. Any buffered data is discarded.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for AwsChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IOResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.verified.is_empty() {
                let n = min(buf.len(), self.verified.len());
                buf[..n].copy_from_slice(&self.verified[..n]);
                self.verified.advance(n);
                return Ok(n);
            }

            if let Some(e) = self.deferred_error.take() {
                return Err(e.into_io_error());
            }

            let n = self.inner.read(&mut self.read_buffer)?;
            if n == 0 {
                self.sequence.finish().map_err(SignatureError::into_io_error)?;
                return Ok(0);
            }

            // Once finished, this rejects any trailing data.
            if let Err(e) = self.sequence.feed(&self.read_buffer[..n], &mut self.verified) {
                if self.verified.is_empty() {
                    return Err(e.into_io_error());
                }

                trace!("deferring chunk failure until {} verified bytes are read", self.verified.len());
                self.deferred_error = Some(e);
            }
        }
    }
}

impl<R> Debug for AwsChunkedReader<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AwsChunkedReader")
            .field("sequence", &self.sequence)
            .field("verified_len", &self.verified.len())
            .field("deferred_error", &self.deferred_error)
            .finish()
    }
}

/// Produces a signed chunked body. This is the client side of [ChunkSignatureSequence].
#[derive(Clone, Debug)]
pub struct ChunkSigner {
    context: ChunkSigningContext,
    prior_signature: [u8; SHA256_OUTPUT_LEN],
}

impl ChunkSigner {
    /// Create a signer seeded with the request's seed signature.
    pub fn new(context: ChunkSigningContext, seed_signature: [u8; SHA256_OUTPUT_LEN]) -> Self {
        Self {
            context,
            prior_signature: seed_signature,
        }
    }

    /// Sign and frame a chunk. An empty payload produces the terminating chunk.
    pub fn sign_chunk(&mut self, payload: &[u8]) -> Bytes {
        let signature = self.context.sign(&self.prior_signature, &sha256(payload));
        self.prior_signature = signature;

        let header = format!("{:x};{}={}\r\n", payload.len(), CHUNK_SIGNATURE, hex::encode(signature));
        let mut frame = BytesMut::with_capacity(header.len() + payload.len() + CRLF.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(CRLF);
        frame.freeze()
    }

    /// Frame a whole body, splitting it into chunks of at most `chunk_size` bytes and appending the terminating
    /// chunk.
    pub fn sign_body(&mut self, body: &[u8], chunk_size: usize) -> Bytes {
        let mut result = BytesMut::new();
        for chunk in body.chunks(chunk_size.max(1)) {
            result.extend_from_slice(&self.sign_chunk(chunk));
        }
        result.extend_from_slice(&self.sign_chunk(b""));
        result.freeze()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{
            AwsChunkedReader, ChunkHeader, ChunkSignatureSequence, ChunkSigner, ChunkSigningContext, ChunkState,
        },
        crate::{constants::*, KSecretKey, ScopeInfo, SignatureError},
        bytes::BytesMut,
        chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc},
        std::{
            io::{ErrorKind, Read},
            str::FromStr,
        },
    };

    const SEED: &str = "4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9";
    const CHUNK1_SIGNATURE: &str = "ad80c730a21e5b8d04586a2213dd63b9a0e99e0e2307b0ade35a65485a288648";
    const CHUNK2_SIGNATURE: &str = "0055627c9e194cb4542bae2aa5492e3c1575bbb81b612b7d234b86a503ef5497";
    const FINAL_SIGNATURE: &str = "b6c6ea8a5354eaf15b3cb7646744f4275b71ea724fed81ceb9323e279d449df9";

    macro_rules! expect_err {
        ($test:expr, $expected:ident) => {
            match $test {
                Ok(ref v) => panic!("Expected Err({}); got Ok({:?})", stringify!($expected), v),
                Err(e) => match e {
                    SignatureError::$expected(ref msg) => msg.clone(),
                    _ => panic!("Expected {}; got {:#?}: {}", stringify!($expected), &e, &e),
                },
            }
        };
    }

    fn decode_signature(s: &str) -> [u8; 32] {
        let mut result = [0u8; 32];
        hex::decode_to_slice(s, &mut result).unwrap();
        result
    }

    fn context() -> ChunkSigningContext {
        let timestamp = DateTime::<Utc>::from_naive_utc_and_offset(
            NaiveDateTime::new(NaiveDate::from_ymd_opt(2013, 5, 24).unwrap(), NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            Utc,
        );
        let signing_key = KSecretKey::from_str("wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY").unwrap().to_ksigning(
            "20130524",
            TEST_REGION,
            TEST_SERVICE,
        );
        ChunkSigningContext::new(signing_key, timestamp, &ScopeInfo::new("20130524", TEST_REGION, TEST_SERVICE))
    }

    fn sequence() -> ChunkSignatureSequence {
        ChunkSignatureSequence::new(context(), decode_signature(SEED), DEFAULT_MAX_CHUNK_SIZE)
    }

    fn signed_body(chunks: &[&[u8]]) -> Vec<u8> {
        let mut signer = ChunkSigner::new(context(), decode_signature(SEED));
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&signer.sign_chunk(chunk));
        }
        body.extend_from_slice(&signer.sign_chunk(b""));
        body
    }

    fn documentation_example_body() -> Vec<u8> {
        signed_body(&[&[b'a'; 65536], &[b'a'; 1024]])
    }

    #[test_log::test]
    fn documentation_example_signatures() {
        let body = documentation_example_body();
        assert_eq!(body.len(), 66824);

        let header1 = format!("10000;chunk-signature={}\r\n", CHUNK1_SIGNATURE);
        assert!(body.starts_with(header1.as_bytes()));

        let header2 = format!("400;chunk-signature={}\r\n", CHUNK2_SIGNATURE);
        let offset2 = header1.len() + 65536 + 2;
        assert_eq!(&body[offset2..offset2 + header2.len()], header2.as_bytes());

        let trailer = format!("0;chunk-signature={}\r\n\r\n", FINAL_SIGNATURE);
        assert!(body.ends_with(trailer.as_bytes()));

        let sts = context().string_to_sign(&decode_signature(SEED), &crate::crypto::sha256(&[b'a'; 65536]));
        assert_eq!(
            String::from_utf8(sts).unwrap(),
            "AWS4-HMAC-SHA256-PAYLOAD\n20130524T000000Z\n20130524/us-east-1/s3/aws4_request\n\
             4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\
             bf718b6f653bebc184e1479f1935b8da974d701b893afcf49e701f3e2f9f9c5a"
        );
    }

    #[test_log::test]
    fn documentation_example_verifies() {
        let body = documentation_example_body();
        let mut seq = sequence();
        let mut output = BytesMut::new();

        assert_eq!(seq.feed(&body, &mut output).unwrap(), 66560);
        assert!(seq.is_finished());
        assert_eq!(seq.prior_signature(), &decode_signature(FINAL_SIGNATURE));
        assert_eq!(output.len(), 66560);
        assert!(output.iter().all(|b| *b == b'a'));
        seq.finish().unwrap();
    }

    #[test_log::test]
    fn byte_at_a_time() {
        let body = signed_body(&[b"hello", b"abc"]);
        let mut seq = sequence();
        let mut output = BytesMut::new();

        for byte in body.iter() {
            seq.feed(std::slice::from_ref(byte), &mut output).unwrap();
        }

        assert!(seq.is_finished());
        assert_eq!(&output[..], b"helloabc");
    }

    #[test_log::test]
    fn corrupt_second_chunk() {
        let mut body = signed_body(&[b"hello", b"abc"]);
        let first_len = ChunkSigner::new(context(), decode_signature(SEED)).sign_chunk(b"hello").len();

        // Flip a payload byte in the second chunk.
        let payload_offset = body[first_len..].windows(2).position(|w| w == CRLF).unwrap() + first_len + 2;
        body[payload_offset] = b'x';

        let mut seq = sequence();
        let mut output = BytesMut::new();
        assert_eq!(seq.feed(&body[..first_len], &mut output).unwrap(), 5);
        assert_eq!(&output[..], b"hello");

        let e = expect_err!(seq.feed(&body[first_len..], &mut output), SignatureDoesNotMatch);
        assert_eq!(
            e.as_deref(),
            Some("The chunk signature we calculated does not match the signature you provided for chunk 2.")
        );
        assert_eq!(&output[..], b"hello");

        // The sequence stays failed.
        let e = expect_err!(seq.feed(b"", &mut output), MalformedChunk);
        assert_eq!(e, "The chunked payload was already rejected.");
        expect_err!(seq.finish(), MalformedChunk);
    }

    #[test_log::test]
    fn wrong_seed() {
        let body = signed_body(&[b"hello"]);
        let mut seed = decode_signature(SEED);
        seed[0] ^= 0xff;
        let mut seq = ChunkSignatureSequence::new(context(), seed, DEFAULT_MAX_CHUNK_SIZE);
        let mut output = BytesMut::new();
        expect_err!(seq.feed(&body, &mut output), SignatureDoesNotMatch);
        assert!(output.is_empty());
    }

    #[test_log::test]
    fn header_parsing() {
        let header = ChunkHeader::from_str(&format!("10000;chunk-signature={}", CHUNK1_SIGNATURE)).unwrap();
        assert_eq!(header.length(), 65536);
        assert_eq!(header.signature(), &decode_signature(CHUNK1_SIGNATURE));

        let header = ChunkHeader::from_str(&format!("aBc;chunk-signature={}", FINAL_SIGNATURE)).unwrap();
        assert_eq!(header.length(), 0xabc);

        for bad in [
            "a;chunk-signature=deadbeef".to_string(),
            format!("a;chunk-signature={};x=y", CHUNK1_SIGNATURE),
            format!("a;chunk-sig={}", CHUNK1_SIGNATURE),
            format!(";chunk-signature={}", CHUNK1_SIGNATURE),
            format!("-a;chunk-signature={}", CHUNK1_SIGNATURE),
            format!("+a;chunk-signature={}", CHUNK1_SIGNATURE),
            format!("xyz;chunk-signature={}", CHUNK1_SIGNATURE),
            format!("10000000000000000;chunk-signature={}", CHUNK1_SIGNATURE),
            format!("a;chunk-signature={}00", CHUNK1_SIGNATURE),
            "a".to_string(),
            "".to_string(),
        ] {
            expect_err!(ChunkHeader::from_str(&bad), MalformedChunk);
        }
    }

    #[test_log::test]
    fn header_too_long() {
        let line = vec![b'a'; MAX_CHUNK_HEADER_LENGTH + 1];
        let e = expect_err!(ChunkState::new().advance(&line, DEFAULT_MAX_CHUNK_SIZE), MalformedChunk);
        assert_eq!(e, "Chunk header exceeds 1000 bytes without a line terminator");

        // Exactly at the limit, a pending CR is still allowed.
        let mut line = vec![b'a'; MAX_CHUNK_HEADER_LENGTH];
        line.push(b'\r');
        let step = ChunkState::new().advance(&line, DEFAULT_MAX_CHUNK_SIZE).unwrap();
        assert_eq!(step.consumed, MAX_CHUNK_HEADER_LENGTH + 1);
        assert!(!step.state.is_complete());
    }

    #[test_log::test]
    fn state_threads_across_buffers() {
        let body = signed_body(&[b"hello"]);
        let first_chunk_len = body.len() - ChunkSigner::new(context(), decode_signature(SEED)).sign_chunk(b"").len();

        let mut state = ChunkState::new();
        let mut payload = Vec::new();
        let mut offset = 0;

        for piece in body[..first_chunk_len].chunks(7) {
            let step = state.advance(piece, DEFAULT_MAX_CHUNK_SIZE).unwrap();
            assert_eq!(step.consumed, piece.len());
            payload.extend_from_slice(&piece[step.payload.clone()]);
            offset += step.consumed;
            state = step.state;
        }

        assert_eq!(offset, first_chunk_len);
        assert_eq!(payload, b"hello");
        match state {
            ChunkState::Complete(chunk) => {
                assert!(!chunk.is_final());
                assert_eq!(chunk.header().length(), 5);
                assert_eq!(chunk.payload_sha256(), &crate::crypto::sha256(b"hello"));
            }
            other => panic!("Expected Complete; got {:?}", other),
        }

        // A completed chunk does not consume bytes belonging to the next one.
        let step = ChunkState::new().advance(&body, DEFAULT_MAX_CHUNK_SIZE).unwrap();
        assert_eq!(step.consumed, first_chunk_len);
        assert!(step.state.is_complete());
    }

    #[test_log::test]
    fn trailer_must_be_crlf() {
        let mut body = signed_body(&[b"hello"]);
        let header_len = body.windows(2).position(|w| w == CRLF).unwrap() + 2;
        body[header_len + 5] = b'\n';

        let mut seq = sequence();
        let mut output = BytesMut::new();
        let e = expect_err!(seq.feed(&body, &mut output), MalformedChunk);
        assert_eq!(e, "Chunk payload is not followed by CRLF");
        assert!(output.is_empty());
    }

    #[test_log::test]
    fn oversized_chunk() {
        let body = signed_body(&[&[b'z'; 64]]);
        let mut seq = ChunkSignatureSequence::new(context(), decode_signature(SEED), 32);
        let mut output = BytesMut::new();
        let e = expect_err!(seq.feed(&body, &mut output), MalformedChunk);
        assert_eq!(e, "Chunk length 64 exceeds the maximum of 32 bytes");
    }

    #[test_log::test]
    fn data_after_final_chunk() {
        let mut body = signed_body(&[b"hello"]);
        body.extend_from_slice(b"junk");

        let mut seq = sequence();
        let mut output = BytesMut::new();
        let e = expect_err!(seq.feed(&body, &mut output), MalformedChunk);
        assert_eq!(e, "Unexpected data after the final chunk");
    }

    #[test_log::test]
    fn reader_yields_verified_bytes() {
        let body = signed_body(&[b"hello", b" ", b"world"]);
        let mut reader = AwsChunkedReader::new(&body[..], sequence());
        let mut result = String::new();
        reader.read_to_string(&mut result).unwrap();
        assert_eq!(result, "hello world");

        // Subsequent reads report EOF.
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test_log::test]
    fn reader_truncated_body() {
        let body = signed_body(&[b"hello", b"world"]);
        let truncated = &body[..body.len() - 10];
        let mut reader = AwsChunkedReader::new(truncated, sequence());
        let mut result = Vec::new();

        let e = reader.read_to_end(&mut result).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidData);
        assert_eq!(result, b"helloworld");

        let e = SignatureError::from_io_error(e);
        assert_eq!(e.to_string(), "The chunked payload ended before the final zero-length chunk.");
    }

    #[test_log::test]
    fn reader_rejects_bad_chunk() {
        let mut body = signed_body(&[b"hello"]);
        let len = body.len();
        // Corrupt the last hex digit of the final chunk signature.
        body[len - 5] = if body[len - 5] == b'0' { b'1' } else { b'0' };

        let mut reader = AwsChunkedReader::new(&body[..], sequence());
        let mut result = Vec::new();
        let e = reader.read_to_end(&mut result).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidData);
        assert_eq!(result, b"hello");
        match SignatureError::from_io_error(e) {
            SignatureError::SignatureDoesNotMatch(_) => (),
            other => panic!("Expected SignatureDoesNotMatch; got {:?}", other),
        }
    }

    /// Change one hex digit of the second chunk's declared signature, leaving its payload intact.
    fn body_with_bad_second_signature() -> Vec<u8> {
        let mut body = signed_body(&[b"hello", b"abc"]);
        let first_len = ChunkSigner::new(context(), decode_signature(SEED)).sign_chunk(b"hello").len();
        let digit = first_len + "3;chunk-signature=".len();
        body[digit] = if body[digit] == b'0' { b'1' } else { b'0' };
        body
    }

    #[test_log::test]
    fn bad_second_signature_keeps_first_chunk() {
        let body = body_with_bad_second_signature();
        let mut seq = sequence();
        let mut output = BytesMut::new();

        let e = expect_err!(seq.feed(&body, &mut output), SignatureDoesNotMatch);
        assert_eq!(
            e.as_deref(),
            Some("The chunk signature we calculated does not match the signature you provided for chunk 2.")
        );
        assert_eq!(&output[..], b"hello");
    }

    #[test_log::test]
    fn reader_releases_chunks_verified_before_failure() {
        let body = body_with_bad_second_signature();
        let mut reader = AwsChunkedReader::new(&body[..], sequence());

        // The whole body arrives in one inner read; the first chunk is still delivered before the error.
        let mut buf = [0u8; 64];
        assert_eq!(reader.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");

        let e = reader.read(&mut buf).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidData);
        assert_eq!(
            SignatureError::from_io_error(e).to_string(),
            "The chunk signature we calculated does not match the signature you provided for chunk 2."
        );

        // The reader stays failed.
        assert!(reader.read(&mut buf).is_err());

        let mut reader = AwsChunkedReader::new(&body[..], sequence());
        let mut result = Vec::new();
        reader.read_to_end(&mut result).unwrap_err();
        assert_eq!(result, b"hello");
    }
}
