//! Shared persistence utilities: atomic file writes, JSON load/save, and a
//! serde adapter for float sequences that may contain non-finite values.

use std::io;
use std::path::{Path, PathBuf};

/// Sibling path used for the write-then-rename protocol.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling, then renames over the target. Creates parent
/// directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

/// Atomically write pretty-printed JSON to a file.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, &json)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist; deserialization failures
/// surface as `InvalidData`.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    let value =
        serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// `#[serde(with = "float_seq")]` for `Vec<f64>`.
///
/// Finite values are plain JSON numbers (exact round-trip with serde_json's
/// `float_roundtrip`); NaN and infinities are written as the strings `"NaN"`,
/// `"inf"`, and `"-inf"`, which plain JSON cannot represent.
pub mod float_seq {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for &value in values {
            if value.is_finite() {
                seq.serialize_element(&value)?;
            } else if value.is_nan() {
                seq.serialize_element("NaN")?;
            } else if value > 0.0 {
                seq.serialize_element("inf")?;
            } else {
                seq.serialize_element("-inf")?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Repr>::deserialize(deserializer)?
            .into_iter()
            .map(|repr| match repr {
                Repr::Number(value) => Ok(value),
                Repr::Text(text) => match text.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(D::Error::custom(format!("invalid float '{other}'"))),
                },
            })
            .collect()
    }
}
