use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{CryptoError, CryptoResult};

/// Hash algorithm used to turn a seed into a namespace UUID.
///
/// The configured primary algorithm is used for every write. Fallback
/// algorithms are consulted only when reading entries written before the
/// primary algorithm changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Legacy: RFC 4122 version-3 (MD5) name-based UUID.
    Md5,
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(CryptoError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Derive a stable namespace UUID from `seed`.
pub fn namespace(seed: &str, algo: HashAlgorithm) -> Uuid {
    match algo {
        HashAlgorithm::Md5 => Uuid::new_v3(&Uuid::nil(), seed.as_bytes()),
        HashAlgorithm::Sha256 => {
            let digest = Sha256::digest(seed.as_bytes());
            Uuid::new_v8(truncate(&digest))
        }
        HashAlgorithm::Blake3 => Uuid::new_v8(truncate(blake3::hash(seed.as_bytes()).as_bytes())),
    }
}

/// Derive a UUID inside `namespace` from a parameter mapping.
///
/// Parameters are serialized as canonical JSON (RFC 8785: object keys sorted
/// at every depth), so `{"a":1,"b":2}` and `{"b":2,"a":1}` derive the same
/// UUID.
pub fn derive<P: Serialize + ?Sized>(namespace: Uuid, params: &P) -> CryptoResult<Uuid> {
    let canonical =
        serde_jcs::to_string(params).map_err(|e| CryptoError::Canonicalize(e.to_string()))?;
    Ok(derive_name(namespace, &canonical))
}

/// Derive a UUID inside `namespace` from a raw name (version-5, SHA-1).
pub fn derive_name(namespace: Uuid, name: &str) -> Uuid {
    Uuid::new_v5(&namespace, name.as_bytes())
}

fn truncate(digest: &[u8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    bytes
}
