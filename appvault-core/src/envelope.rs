/*!
Symmetric encryption envelope for sealed artifacts.

A sealed artifact is base64 text over the binary frame

```text
MAGIC | algorithm length (u8) | algorithm name | AES-256-GCM ciphertext
```

The plaintext is compressed before encryption and the header is bound to the
ciphertext as associated data. The key is derived from a pre-shared string
and the nonce is fixed, so sealing the same bytes twice yields the same text.

Accidental damage (truncation, bit flips, a different key, a rewritten
header) is detected on open. The tag is not a forgery guarantee: with a
fixed nonce under a static key, anyone holding two sealed artifacts can
recover the authentication key and the keystream. The envelope keeps a
closed-loop format stable; it does not protect artifacts against a
deliberate attacker.
*/

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::compression::{compressor_for, CompressionAdapter, GzipCompressor};
use crate::{Result, VaultError};

const ENVELOPE_MAGIC: &[u8; 6] = b"AVENV1";
const ENVELOPE_NONCE: [u8; 12] = *b"appvault-env";

/// Seals and opens artifact payloads with one pre-shared key
pub struct Envelope {
    cipher: Aes256Gcm,
    compressor: Box<dyn CompressionAdapter + Send + Sync>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("compression", &self.compressor.algorithm_name())
            .finish_non_exhaustive()
    }
}

impl Envelope {
    /// Envelope keyed by the SHA-256 digest of `key`, compressing with gzip
    pub fn new(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&digest),
            compressor: Box::new(GzipCompressor::new()),
        }
    }

    /// Replace the compressor used when sealing.
    ///
    /// Opening always uses the algorithm recorded in the envelope header.
    pub fn with_compressor<C>(mut self, compressor: C) -> Self
    where
        C: CompressionAdapter + Send + Sync + 'static,
    {
        self.compressor = Box::new(compressor);
        self
    }

    /// Compress, encrypt and encode `plaintext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<String> {
        let algorithm = self.compressor.algorithm_name().as_bytes();
        let algorithm_len = u8::try_from(algorithm.len())
            .map_err(|_| VaultError::envelope("compression algorithm name too long"))?;

        let mut frame = Vec::with_capacity(ENVELOPE_MAGIC.len() + 1 + algorithm.len());
        frame.extend_from_slice(ENVELOPE_MAGIC);
        frame.push(algorithm_len);
        frame.extend_from_slice(algorithm);

        let compressed = self.compressor.compress(plaintext)?;
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&ENVELOPE_NONCE),
                Payload {
                    msg: &compressed,
                    aad: &frame,
                },
            )
            .map_err(|e| VaultError::envelope(format!("AES-GCM encrypt failed: {e}")))?;
        frame.extend_from_slice(&ciphertext);

        debug!(
            plaintext = plaintext.len(),
            compressed = compressed.len(),
            sealed = frame.len(),
            "Sealed envelope"
        );
        Ok(STANDARD.encode(frame))
    }

    /// Decode, decrypt and decompress a sealed text.
    ///
    /// Every failure is reported as [`VaultError::EnvelopeCorrupt`].
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>> {
        let frame = STANDARD
            .decode(sealed.trim())
            .map_err(|e| VaultError::envelope(format!("invalid transport encoding: {e}")))?;

        let header_start = ENVELOPE_MAGIC.len();
        if frame.len() <= header_start || !frame.starts_with(ENVELOPE_MAGIC) {
            return Err(VaultError::envelope("missing envelope header"));
        }
        let header_end = header_start + 1 + usize::from(frame[header_start]);
        if frame.len() < header_end {
            return Err(VaultError::envelope("truncated envelope header"));
        }
        let (header, ciphertext) = frame.split_at(header_end);

        let algorithm = std::str::from_utf8(&header[header_start + 1..])
            .map_err(|_| VaultError::envelope("compression algorithm is not UTF-8"))?;
        let compressor = compressor_for(algorithm).ok_or_else(|| {
            VaultError::envelope(format!("unknown compression algorithm {algorithm:?}"))
        })?;

        let compressed = self
            .cipher
            .decrypt(
                Nonce::from_slice(&ENVELOPE_NONCE),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| VaultError::envelope("ciphertext does not match the key"))?;

        compressor
            .decompress(&compressed)
            .map_err(|e| VaultError::envelope(format!("payload does not decompress: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::NoCompression;
    use rand::{Rng, SeedableRng};

    const KEY: &str = "test-key";

    #[test]
    fn test_seal_then_open() {
        let envelope = Envelope::new(KEY);
        let payload = br#"{"preferenceStores":{"account":{"uid":"123456"}}}"#;

        let sealed = envelope.seal(payload).unwrap();
        assert!(sealed.is_ascii());
        assert_eq!(envelope.open(&sealed).unwrap(), payload);
    }

    #[test]
    fn test_sealing_is_deterministic() {
        let envelope = Envelope::new(KEY);
        let payload = b"same bytes in, same text out";
        assert_eq!(envelope.seal(payload).unwrap(), envelope.seal(payload).unwrap());
        assert_eq!(
            Envelope::new(KEY).seal(payload).unwrap(),
            envelope.seal(payload).unwrap()
        );
    }

    #[test]
    fn test_open_tolerates_surrounding_whitespace() {
        let envelope = Envelope::new(KEY);
        let sealed = envelope.seal(b"payload").unwrap();
        assert_eq!(envelope.open(&format!("\n{sealed}\n")).unwrap(), b"payload");
    }

    #[test]
    fn test_uncompressed_envelope_opens_with_default_envelope() {
        let raw = Envelope::new(KEY).with_compressor(NoCompression::new());
        let sealed = raw.seal(b"plain payload").unwrap();
        assert_eq!(Envelope::new(KEY).open(&sealed).unwrap(), b"plain payload");
    }

    #[test]
    fn test_wrong_key_is_corrupt() {
        let sealed = Envelope::new(KEY).seal(b"secret").unwrap();
        let err = Envelope::new("other-key").open(&sealed).unwrap_err();
        assert!(matches!(err, VaultError::EnvelopeCorrupt(_)));
    }

    #[test]
    fn test_tampered_ciphertext_is_corrupt() {
        let envelope = Envelope::new(KEY);
        let sealed = envelope.seal(b"some payload worth protecting").unwrap();
        let mut frame = STANDARD.decode(&sealed).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let err = envelope.open(&STANDARD.encode(frame)).unwrap_err();
        assert!(matches!(err, VaultError::EnvelopeCorrupt(_)));
    }

    #[test]
    fn test_tampered_header_is_corrupt() {
        let envelope = Envelope::new(KEY).with_compressor(NoCompression::new());
        let sealed = envelope.seal(b"payload").unwrap();
        let mut frame = STANDARD.decode(&sealed).unwrap();
        // "none" -> "gone": still four bytes, no longer a known algorithm
        frame[ENVELOPE_MAGIC.len() + 1] = b'g';

        let err = envelope.open(&STANDARD.encode(frame)).unwrap_err();
        assert!(matches!(err, VaultError::EnvelopeCorrupt(_)));
    }

    #[test]
    fn test_truncated_and_malformed_input_is_corrupt() {
        let envelope = Envelope::new(KEY);
        let sealed = envelope.seal(b"payload").unwrap();

        for input in [
            "",
            "not base64 at all!",
            &sealed[..sealed.len() / 2],
            STANDARD.encode(b"AVENV1").as_str(),
            STANDARD.encode(b"AVENV1\x10gz").as_str(),
        ] {
            let err = envelope.open(input).unwrap_err();
            assert!(err.is_envelope_corrupt(), "{input:?} gave {err:?}");
        }
    }

    #[test]
    fn test_random_input_never_panics() {
        let envelope = Envelope::new(KEY);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let len = rng.gen_range(0..256);
            let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            assert!(envelope.open(&STANDARD.encode(&bytes)).is_err());

            let text: String = (0..len).map(|_| rng.gen_range(' '..='~')).collect();
            assert!(envelope.open(&text).is_err());
        }
    }
}
