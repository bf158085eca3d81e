//! BagIt tag files: the `bagit.txt` declaration and payload manifests.

use std::path::Path;

use crate::checksum::ChecksumAlgorithm;
use crate::validate::Defect;

const DECLARATION: &str = "bagit.txt";
const REQUIRED_KEYS: [&str; 2] = ["BagIt-Version", "Tag-File-Character-Encoding"];

/// Check `bagit.txt` declares the required keys.
pub fn check_declaration(bag: &Path) -> Vec<Defect> {
    let text = match std::fs::read_to_string(bag.join(DECLARATION)) {
        Ok(text) => text,
        Err(_) => return vec![Defect::MissingDeclaration],
    };
    let keys: Vec<&str> = text
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, _)| key.trim())
        .collect();
    REQUIRED_KEYS
        .iter()
        .filter(|required| !keys.contains(required))
        .map(|key| Defect::IncompleteDeclaration(key.to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub checksum: String,
    /// Path relative to the bag root, `/`-separated and percent-decoded.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// File name, e.g. `manifest-sha256.txt`.
    pub name: String,
    /// `None` when the algorithm is not one we can verify.
    pub algorithm: Option<ChecksumAlgorithm>,
    pub entries: Vec<ManifestEntry>,
}

/// Load every `manifest-<alg>.txt` in the bag root, sorted by file name.
/// Parse defects are appended to `defects`.
pub fn load_manifests(bag: &Path, defects: &mut Vec<Defect>) -> std::io::Result<Vec<Manifest>> {
    let mut names: Vec<String> = std::fs::read_dir(bag)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("manifest-") && name.ends_with(".txt"))
        .collect();
    names.sort();

    if names.is_empty() {
        defects.push(Defect::NoManifest);
    }

    let mut manifests = Vec::with_capacity(names.len());
    for name in names {
        let algorithm_name = &name["manifest-".len()..name.len() - ".txt".len()];
        let algorithm = ChecksumAlgorithm::from_name(algorithm_name);
        if algorithm.is_none() {
            defects.push(Defect::UnsupportedAlgorithm {
                manifest: name.clone(),
                algorithm: algorithm_name.to_string(),
            });
        }
        let entries = match std::fs::read_to_string(bag.join(&name)) {
            Ok(text) => parse_entries(&name, &text, defects),
            Err(e) => {
                defects.push(Defect::Unreadable {
                    path: name.clone(),
                    error: e.to_string(),
                });
                Vec::new()
            }
        };
        manifests.push(Manifest {
            name,
            algorithm,
            entries,
        });
    }
    Ok(manifests)
}

/// Parse `<checksum> <path>` lines. Blank lines are skipped.
pub fn parse_entries(manifest: &str, text: &str, defects: &mut Vec<Defect>) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .split_once([' ', '\t'])
            .map(|(checksum, path)| (checksum, path.trim_start_matches([' ', '\t'])))
            .filter(|(checksum, path)| !checksum.is_empty() && !path.is_empty());
        let Some((checksum, path)) = parsed else {
            defects.push(Defect::MalformedManifestLine {
                manifest: manifest.to_string(),
                line: index + 1,
            });
            continue;
        };
        let path = decode_path(path);
        if escapes_bag(&path) {
            defects.push(Defect::UnsafePath {
                manifest: manifest.to_string(),
                path,
            });
            continue;
        }
        entries.push(ManifestEntry {
            checksum: checksum.to_ascii_lowercase(),
            path,
        });
    }
    entries
}

fn decode_path(path: &str) -> String {
    path.replace("%0A", "\n")
        .replace("%0D", "\r")
        .replace("%25", "%")
}

fn escapes_bag(path: &str) -> bool {
    path.starts_with('/')
        || path.starts_with('\\')
        || path.split(['/', '\\']).any(|segment| segment == "..")
        || Path::new(path).has_root()
}
