/*!
 * Serialization Adapters
 *
 * Turn a value into the full content of one file and back. `write` always
 * replaces the whole file; there is no append or partial write.
 */

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::Path;

use crate::core::errors::{StoreError, StoreResult};

/// Reads and writes values of type `T` at a path
pub trait FileAdapter<T>: Send + Sync + 'static {
    /// Replace the file's content with `value`
    fn write(&self, path: &Path, value: &T) -> StoreResult<()>;

    /// Decode the file's content
    fn read(&self, path: &Path) -> StoreResult<T>;
}

/// Raw bytes, stored verbatim
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesAdapter;

impl FileAdapter<Vec<u8>> for BytesAdapter {
    fn write(&self, path: &Path, value: &Vec<u8>) -> StoreResult<()> {
        fs::write(path, value).map_err(|e| StoreError::io(path, e))
    }

    fn read(&self, path: &Path) -> StoreResult<Vec<u8>> {
        fs::read(path).map_err(|e| StoreError::io(path, e))
    }
}

/// UTF-8 text, stored and returned verbatim (line breaks included)
#[derive(Debug, Clone, Copy, Default)]
pub struct StringAdapter;

impl FileAdapter<String> for StringAdapter {
    fn write(&self, path: &Path, value: &String) -> StoreResult<()> {
        fs::write(path, value.as_bytes()).map_err(|e| StoreError::io(path, e))
    }

    fn read(&self, path: &Path) -> StoreResult<String> {
        fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::InvalidData => StoreError::codec(path, "file is not valid UTF-8"),
            _ => StoreError::io(path, e),
        })
    }
}

/// Any serde type, stored as JSON
pub struct JsonAdapter<T> {
    pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonAdapter<T> {
    pub fn new() -> Self {
        Self {
            pretty: false,
            _marker: PhantomData,
        }
    }

    /// Indented output, for files meant to be read by people
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonAdapter")
            .field("type", &std::any::type_name::<T>())
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl<T> FileAdapter<T> for JsonAdapter<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn write(&self, path: &Path, value: &T) -> StoreResult<()> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|e| StoreError::codec(path, e))?;
        fs::write(path, bytes).map_err(|e| StoreError::io(path, e))
    }

    fn read(&self, path: &Path) -> StoreResult<T> {
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::codec(path, e))
    }
}

/// Any serde type, stored with bincode
pub struct BincodeAdapter<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeAdapter<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BincodeAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeAdapter")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> FileAdapter<T> for BincodeAdapter<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn write(&self, path: &Path, value: &T) -> StoreResult<()> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::codec(path, e))?;
        fs::write(path, bytes).map_err(|e| StoreError::io(path, e))
    }

    fn read(&self, path: &Path) -> StoreResult<T> {
        let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::codec(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Settings {
        volume: u8,
        name: String,
    }

    #[test]
    fn test_string_adapter_keeps_line_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text");
        StringAdapter
            .write(&path, &"line one\nline two\n".to_string())
            .unwrap();
        assert_eq!(StringAdapter.read(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_string_adapter_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text");
        StringAdapter.write(&path, &"a much longer value".to_string()).unwrap();
        StringAdapter.write(&path, &"short".to_string()).unwrap();
        assert_eq!(StringAdapter.read(&path).unwrap(), "short");
    }

    #[test]
    fn test_string_adapter_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        BytesAdapter.write(&path, &vec![0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            StringAdapter.read(&path),
            Err(StoreError::Codec { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        assert!(matches!(BytesAdapter.read(&path), Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_json_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings");
        let adapter = JsonAdapter::<Settings>::pretty();
        let value = Settings {
            volume: 7,
            name: "den".into(),
        };

        adapter.write(&path, &value).unwrap();
        assert_eq!(adapter.read(&path).unwrap(), value);

        fs::write(&path, b"").unwrap();
        assert!(matches!(adapter.read(&path), Err(StoreError::Codec { .. })));
    }

    #[test]
    fn test_bincode_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.bin");
        let adapter = BincodeAdapter::<Settings>::new();
        let value = Settings {
            volume: 3,
            name: "kitchen".into(),
        };

        adapter.write(&path, &value).unwrap();
        assert_eq!(adapter.read(&path).unwrap(), value);
    }
}
