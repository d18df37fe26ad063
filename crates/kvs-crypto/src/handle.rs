use std::fmt;

use crate::error::{CryptoError, CryptoResult};

/// Default handle alphabet (62 alphanumerics).
pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
/// Default minimum handle length.
pub const DEFAULT_MIN_LENGTH: usize = 11;

const SEPARATOR_CANDIDATES: &[u8] = b"cfhistuCFHISTU";
const MIN_ALPHABET_LENGTH: usize = 16;
const SEPARATOR_RATIO: f64 = 3.5;
const GUARD_RATIO: f64 = 12.0;

/// Reversible mapping between entry ids and short opaque strings.
///
/// The alphabet is split into value characters, separators, and guards, and
/// every split is shuffled by the salt, so the same id encodes differently
/// under different salts and consecutive ids do not look sequential.
/// Decoding re-encodes the result and rejects any string that does not
/// round-trip, which is how a handle minted under another salt is refused.
///
/// Work is bounded by the digit count of a `u64`, so both directions run in
/// constant time with respect to the id's magnitude.
#[derive(Clone)]
pub struct HandleCodec {
    salt: Vec<u8>,
    alphabet: Vec<u8>,
    separators: Vec<u8>,
    guards: Vec<u8>,
    min_length: usize,
}

impl fmt::Debug for HandleCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCodec")
            .field("min_length", &self.min_length)
            .finish_non_exhaustive()
    }
}

impl HandleCodec {
    /// Build a codec for `salt` with the default alphabet and minimum length.
    pub fn with_salt(salt: &str) -> Self {
        Self::build(salt, unique_bytes(DEFAULT_ALPHABET), DEFAULT_MIN_LENGTH)
    }

    /// Build a codec. The alphabet must be ASCII, contain no whitespace, and
    /// have at least 16 unique characters.
    pub fn new(salt: &str, alphabet: &str, min_length: usize) -> CryptoResult<Self> {
        if !alphabet.is_ascii() {
            return Err(CryptoError::InvalidAlphabet("must be ASCII".into()));
        }
        if alphabet.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(CryptoError::InvalidAlphabet("must not contain whitespace".into()));
        }
        let unique = unique_bytes(alphabet);
        if unique.len() < MIN_ALPHABET_LENGTH {
            return Err(CryptoError::InvalidAlphabet(format!(
                "needs at least {MIN_ALPHABET_LENGTH} unique characters, got {}",
                unique.len()
            )));
        }
        Ok(Self::build(salt, unique, min_length))
    }

    fn build(salt: &str, unique: Vec<u8>, min_length: usize) -> Self {
        let salt = salt.as_bytes().to_vec();
        let mut separators: Vec<u8> = SEPARATOR_CANDIDATES
            .iter()
            .copied()
            .filter(|c| unique.contains(c))
            .collect();
        let mut alphabet: Vec<u8> = unique
            .into_iter()
            .filter(|c| !separators.contains(c))
            .collect();

        shuffle(&mut separators, &salt);

        let min_separators = ratio(alphabet.len(), SEPARATOR_RATIO);
        if min_separators > separators.len() {
            let missing = min_separators - separators.len();
            separators.extend(alphabet.drain(..missing));
        }

        shuffle(&mut alphabet, &salt);

        let guard_count = ratio(alphabet.len(), GUARD_RATIO);
        let guards = if alphabet.len() < 3 {
            separators.drain(..guard_count).collect()
        } else {
            alphabet.drain(..guard_count).collect()
        };

        Self {
            salt,
            alphabet,
            separators,
            guards,
            min_length,
        }
    }

    /// Encode a non-negative id.
    pub fn encode(&self, id: i64) -> CryptoResult<String> {
        let value = u64::try_from(id).map_err(|_| CryptoError::UnencodableId(id))?;
        Ok(self.encode_value(value))
    }

    /// Decode a handle back into the id it encodes.
    pub fn decode(&self, handle: &str) -> CryptoResult<i64> {
        let malformed = || CryptoError::MalformedHandle(handle.to_string());
        if handle.is_empty() || !handle.is_ascii() {
            return Err(malformed());
        }
        let bytes = handle.as_bytes();

        let parts = split(bytes, &self.guards);
        let body = if (2..=3).contains(&parts.len()) {
            parts[1]
        } else {
            parts[0]
        };
        let (&lottery, rest) = body.split_first().ok_or_else(malformed)?;

        // Handles carry exactly one value, so there must be no separator.
        let values = split(rest, &self.separators);
        if values.len() != 1 || values[0].is_empty() {
            return Err(malformed());
        }

        let mut alphabet = self.alphabet.clone();
        let alphabet_salt = self.alphabet_salt(lottery, &alphabet);
        shuffle(&mut alphabet, &alphabet_salt);
        let value = unhash(values[0], &alphabet).ok_or_else(malformed)?;

        if self.encode_value(value).as_bytes() != bytes {
            return Err(malformed());
        }
        i64::try_from(value).map_err(|_| malformed())
    }

    fn encode_value(&self, value: u64) -> String {
        let mut alphabet = self.alphabet.clone();
        let len = alphabet.len() as u64;
        let values_hash = value % 100;

        let lottery = alphabet[(values_hash % len) as usize];
        let mut encoded = vec![lottery];

        let alphabet_salt = self.alphabet_salt(lottery, &alphabet);
        shuffle(&mut alphabet, &alphabet_salt);
        encoded.extend(hash(value, &alphabet));

        if encoded.len() < self.min_length {
            self.pad(&mut encoded, &alphabet, values_hash);
        }
        // Every byte comes from the ASCII alphabet.
        encoded.into_iter().map(char::from).collect()
    }

    fn pad(&self, encoded: &mut Vec<u8>, alphabet: &[u8], values_hash: u64) {
        let guards = self.guards.len() as u64;
        let index = (values_hash + u64::from(encoded[0])) % guards;
        encoded.insert(0, self.guards[index as usize]);

        if encoded.len() < self.min_length {
            let index = (values_hash + u64::from(encoded[2])) % guards;
            encoded.push(self.guards[index as usize]);
        }

        let mut alphabet = alphabet.to_vec();
        let half = alphabet.len() / 2;
        while encoded.len() < self.min_length {
            let key = alphabet.clone();
            shuffle(&mut alphabet, &key);

            let mut padded = Vec::with_capacity(alphabet.len() + encoded.len());
            padded.extend_from_slice(&alphabet[half..]);
            padded.extend_from_slice(encoded);
            padded.extend_from_slice(&alphabet[..half]);

            let excess = padded.len().saturating_sub(self.min_length);
            if excess > 0 {
                let from = excess / 2;
                padded = padded[from..from + self.min_length].to_vec();
            }
            *encoded = padded;
        }
    }

    fn alphabet_salt(&self, lottery: u8, alphabet: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(1 + self.salt.len() + alphabet.len());
        buffer.push(lottery);
        buffer.extend_from_slice(&self.salt);
        buffer.extend_from_slice(alphabet);
        buffer.truncate(alphabet.len());
        buffer
    }
}

fn unique_bytes(alphabet: &str) -> Vec<u8> {
    let mut unique: Vec<u8> = Vec::with_capacity(alphabet.len());
    for b in alphabet.bytes() {
        if !unique.contains(&b) {
            unique.push(b);
        }
    }
    unique
}

/// Deterministic salt-keyed shuffle.
fn shuffle(alphabet: &mut [u8], salt: &[u8]) {
    if salt.is_empty() {
        return;
    }
    let mut index = 0usize;
    let mut sum = 0usize;
    for i in (1..alphabet.len()).rev() {
        let integer = usize::from(salt[index]);
        sum += integer;
        let j = (integer + index + sum) % i;
        alphabet.swap(i, j);
        index = (index + 1) % salt.len();
    }
}

fn hash(mut value: u64, alphabet: &[u8]) -> Vec<u8> {
    let len = alphabet.len() as u64;
    let mut out = Vec::new();
    loop {
        out.push(alphabet[(value % len) as usize]);
        value /= len;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    out
}

fn unhash(digits: &[u8], alphabet: &[u8]) -> Option<u64> {
    let len = alphabet.len() as u64;
    digits.iter().try_fold(0u64, |acc, c| {
        let position = alphabet.iter().position(|a| a == c)? as u64;
        acc.checked_mul(len)?.checked_add(position)
    })
}

fn split<'a>(bytes: &'a [u8], splitters: &[u8]) -> Vec<&'a [u8]> {
    bytes.split(|b| splitters.contains(b)).collect()
}

fn ratio(len: usize, divisor: f64) -> usize {
    (len as f64 / divisor).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &str = "Yw3yRxVn-lM7fY2mYwK4mq2C5Rc1Vx4yq0Yq6YpS3cUuK9e2c3d0mIuQ5b8YbX3P";

    #[test]
    fn roundtrip_small_and_large_ids() {
        let codec = HandleCodec::with_salt(SALT);
        for id in [0, 1, 2, 42, 99, 100, 12_345, 1 << 40, i64::MAX] {
            let handle = codec.encode(id).unwrap();
            assert_eq!(codec.decode(&handle).unwrap(), id, "handle {handle}");
        }
    }

    #[test]
    fn respects_min_length() {
        let codec = HandleCodec::with_salt(SALT);
        for id in [1, 77, 5_000] {
            assert!(codec.encode(id).unwrap().len() >= DEFAULT_MIN_LENGTH);
        }
        let short = HandleCodec::new(SALT, DEFAULT_ALPHABET, 0).unwrap();
        assert!(short.encode(1).unwrap().len() < DEFAULT_MIN_LENGTH);
        assert_eq!(short.decode(&short.encode(1).unwrap()).unwrap(), 1);
    }

    #[test]
    fn handles_use_only_alphabet_characters() {
        let codec = HandleCodec::with_salt(SALT);
        let handle = codec.encode(31_337).unwrap();
        assert!(handle.chars().all(|c| DEFAULT_ALPHABET.contains(c)));
    }

    #[test]
    fn consecutive_ids_are_not_sequential_strings() {
        let codec = HandleCodec::with_salt(SALT);
        let a = codec.encode(1000).unwrap();
        let b = codec.encode(1001).unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..a.len() - 1], b[..b.len() - 1]);
    }

    #[test]
    fn salt_changes_encoding() {
        let a = HandleCodec::with_salt("salt-a").encode(42).unwrap();
        let b = HandleCodec::with_salt("salt-b").encode(42).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_salt_fails_or_yields_other_id() {
        let handle = HandleCodec::with_salt("salt-a").encode(42).unwrap();
        match HandleCodec::with_salt("salt-b").decode(&handle) {
            Err(CryptoError::MalformedHandle(_)) => {}
            Ok(id) => assert_ne!(id, 42),
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = HandleCodec::with_salt(SALT);
        for garbage in ["", "garbage", "!!!", "ünïcode", "a b"] {
            assert!(codec.decode(garbage).is_err(), "{garbage:?} decoded");
        }
    }

    #[test]
    fn negative_ids_are_rejected() {
        let codec = HandleCodec::with_salt(SALT);
        assert_eq!(codec.encode(-1), Err(CryptoError::UnencodableId(-1)));
    }

    #[test]
    fn alphabet_validation() {
        assert!(HandleCodec::new(SALT, "abc", 0).is_err());
        assert!(HandleCodec::new(SALT, "abcdefghij klmnopqrstu", 0).is_err());
        assert!(HandleCodec::new(SALT, "àbcdefghijklmnopqrstu", 0).is_err());
        // Duplicates do not count towards the minimum.
        assert!(HandleCodec::new(SALT, "aaaaaaaaaaaaaaaaaaaaaaaa", 0).is_err());
        assert!(HandleCodec::new(SALT, "0123456789abcdef", 0).is_ok());
    }

    #[test]
    fn custom_alphabet_roundtrip() {
        let codec = HandleCodec::new(SALT, "0123456789abcdefghijklmnopqrstuv", 8).unwrap();
        let handle = codec.encode(987_654_321).unwrap();
        assert!(handle.len() >= 8);
        assert_eq!(codec.decode(&handle).unwrap(), 987_654_321);
    }

    proptest::proptest! {
        #[test]
        fn decode_inverts_encode(id in 0i64..=i64::MAX, salt in "[A-Za-z0-9_-]{0,64}") {
            let codec = HandleCodec::with_salt(&salt);
            let handle = codec.encode(id).unwrap();
            proptest::prop_assert_eq!(codec.decode(&handle).unwrap(), id);
        }
    }
}
