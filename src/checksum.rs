//! Streaming file checksums for manifest verification.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

/// Digest algorithms a BagIt manifest may use that we can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Algorithm for a manifest name such as `sha256` in `manifest-sha256.txt`.
    /// `None` for names we cannot verify.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "sha1" => Some(ChecksumAlgorithm::Sha1),
            "sha256" => Some(ChecksumAlgorithm::Sha256),
            "sha512" => Some(ChecksumAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn stream<R: Read>(reader: &mut R, mut update: impl FnMut(&[u8])) -> std::io::Result<()> {
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            return Ok(());
        }
        update(&buffer[..bytes_read]);
    }
}

/// Lowercase hex digest of everything `reader` yields.
pub fn compute_checksum<R: Read>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
) -> std::io::Result<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => {
            let mut context = md5::Context::new();
            stream(reader, |chunk| context.consume(chunk))?;
            Ok(hex::encode(context.compute().0))
        }
        ChecksumAlgorithm::Sha1 => {
            let mut hasher = Sha1::new();
            stream(reader, |chunk| hasher.update(chunk))?;
            Ok(hex::encode(hasher.finalize()))
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            stream(reader, |chunk| hasher.update(chunk))?;
            Ok(hex::encode(hasher.finalize()))
        }
        ChecksumAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            stream(reader, |chunk| hasher.update(chunk))?;
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

pub fn compute_file_checksum(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn digest(algorithm: ChecksumAlgorithm) -> String {
        compute_checksum(&mut Cursor::new(b"hello world"), algorithm).unwrap()
    }

    #[test]
    fn known_digests() {
        assert_eq!(
            digest(ChecksumAlgorithm::Md5),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            digest(ChecksumAlgorithm::Sha1),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            digest(ChecksumAlgorithm::Sha256),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            digest(ChecksumAlgorithm::Sha512),
            "309ecc489c12d6eb4cc40f50c902f2b4d0ed77ee511a7c7a9bcd3ca86d4cd86f989dd35bc5ff499670da34255b45b0cfd830e81f605dcf7dc5542e93ae9cd76f"
        );
    }

    #[test]
    fn manifest_names() {
        assert_eq!(ChecksumAlgorithm::from_name("SHA256"), Some(ChecksumAlgorithm::Sha256));
        assert_eq!(ChecksumAlgorithm::from_name("md5"), Some(ChecksumAlgorithm::Md5));
        assert_eq!(ChecksumAlgorithm::from_name("sha1"), Some(ChecksumAlgorithm::Sha1));
        assert_eq!(ChecksumAlgorithm::from_name("sha3-256"), None);
    }

    #[test]
    fn file_checksum_matches_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            compute_file_checksum(&path, ChecksumAlgorithm::Sha256).unwrap(),
            digest(ChecksumAlgorithm::Sha256)
        );
    }
}
