//! File-based storage backend.
//!
//! Each key is stored in its own file under `storage_path`. Writes go to a
//! temporary file which is then renamed over the target, so a reader sees
//! either the old value or the new one.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use escrow_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use sha3::{Digest, Sha3_256};
use std::path::{Path, PathBuf};
use tokio::fs;

const DATA_EXTENSION: &str = "bin";
const TEMP_EXTENSION: &str = "tmp";

/// Longest encoded key used directly as a file stem.
const MAX_STEM_LEN: usize = 200;

/// Stem prefix for hashed keys. [`decode_key`] rejects it.
const HASHED_PREFIX: &str = "%%";

/// Fixed-size file header.
///
/// Binary layout (8 bytes total):
/// - [0-3]: Magic bytes "ESCS"
/// - [4-5]: Version (u16, little-endian)
/// - [6]: Flags
/// - [7]: Reserved
///
/// With [`FileHeader::FLAG_KEYED`] set, the header is followed by the key
/// (u32 little-endian length, then UTF-8 bytes) and then the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	flags: u8,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ESCS";
	const VERSION: u16 = 1;
	const SIZE: usize = 8;
	const FLAG_KEYED: u8 = 0x01;

	fn current(keyed: bool) -> Self {
		Self {
			version: Self::VERSION,
			flags: if keyed { Self::FLAG_KEYED } else { 0 },
		}
	}

	fn is_keyed(&self) -> bool {
		self.flags & Self::FLAG_KEYED != 0
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6] = self.flags;
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognised file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		Ok(Self {
			version,
			flags: bytes[6],
		})
	}
}

/// Encodes a key as a file stem.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
	let mut encoded = String::with_capacity(key.len());
	for byte in key.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			encoded.push(byte as char);
		} else {
			encoded.push_str(&format!("%{:02X}", byte));
		}
	}
	encoded
}

/// Reverses [`encode_key`]. Returns `None` for stems it could not have produced.
fn decode_key(stem: &str) -> Option<String> {
	let bytes = stem.as_bytes();
	let mut decoded = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = stem.get(i + 1..i + 3)?;
			decoded.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			decoded.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(decoded).ok()
}

/// File stem for a key.
///
/// Keys whose encoding would exceed [`MAX_STEM_LEN`] are stored under a
/// SHA3-256 digest instead, and the key itself is kept inside the file.
fn file_stem(key: &str) -> String {
	let encoded = encode_key(key);
	if encoded.len() <= MAX_STEM_LEN {
		return encoded;
	}
	format!(
		"{}{}",
		HASHED_PREFIX,
		hex::encode(Sha3_256::digest(key.as_bytes()))
	)
}

/// Splits file contents into the embedded key, if any, and the stored value.
fn parse_file(data: &[u8]) -> Result<(Option<String>, &[u8]), StorageError> {
	let header = FileHeader::deserialize(data)?;
	let body = &data[FileHeader::SIZE..];
	if !header.is_keyed() {
		return Ok((None, body));
	}

	let truncated = || StorageError::Backend("Truncated key record".into());
	let len_bytes: [u8; 4] = body
		.get(0..4)
		.and_then(|b| b.try_into().ok())
		.ok_or_else(truncated)?;
	let key_end = 4 + u32::from_le_bytes(len_bytes) as usize;
	let key_bytes = body.get(4..key_end).ok_or_else(truncated)?;
	let key = String::from_utf8(key_bytes.to_vec())
		.map_err(|_| StorageError::Backend("Stored key is not UTF-8".into()))?;
	Ok((Some(key), &body[key_end..]))
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Directory the files live in.
	pub fn base_path(&self) -> &Path {
		&self.base_path
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", file_stem(key), DATA_EXTENSION))
	}

	/// Reads the key kept inside a hashed file.
	async fn read_embedded_key(path: &Path) -> Option<String> {
		let data = fs::read(path).await.ok()?;
		parse_file(&data).ok()?.0
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let (stored_key, value) = parse_file(&data)?;
		if stored_key.is_some_and(|stored| stored != key) {
			return Err(StorageError::Backend(format!(
				"File {:?} holds a different key",
				path
			)));
		}
		Ok(value.to_vec())
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let keyed = file_stem(key).starts_with(HASHED_PREFIX);

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&FileHeader::current(keyed).serialize());
		if keyed {
			let key_len = u32::try_from(key.len())
				.map_err(|_| StorageError::Backend("Key too long".into()))?;
			file_data.extend_from_slice(&key_len.to_le_bytes());
			file_data.extend_from_slice(key.as_bytes());
		}
		file_data.extend_from_slice(&value);

		let temp_path = path.with_extension(TEMP_EXTENSION);
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			// Nothing has been written yet.
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(DATA_EXTENSION)) {
				continue;
			}
			let key = match path.file_stem().and_then(|stem| stem.to_str()) {
				Some(stem) if stem.starts_with(HASHED_PREFIX) => {
					Self::read_embedded_key(&path).await
				},
				Some(stem) => decode_key(stem),
				None => None,
			};
			let Some(key) = key else {
				tracing::debug!("Skipping unrecognised storage file {:?}", path);
				continue;
			};
			if key.starts_with(prefix) {
				keys.push(key);
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("") => Err("storage_path cannot be empty".to_string()),
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: directory for the files (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl escrow_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_key_encoding_reverses() {
		for key in ["order_slots:alex", "order_slots:a/b c", "order_slots:élan"] {
			let encoded = encode_key(key);
			assert!(!encoded.contains(':'));
			assert!(!encoded.contains('/'));
			assert_eq!(decode_key(&encoded).as_deref(), Some(key));
		}
		assert_eq!(decode_key("bad%G1"), None);
		assert_eq!(decode_key("short%4"), None);
		assert_eq!(decode_key("%%00"), None);
	}

	#[tokio::test]
	async fn test_long_keys_use_hashed_file_names() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());
		let long_plain = format!("order_slots:{}", "a".repeat(250));
		let long_escaped = format!("order_slots:{}", "/".repeat(100));

		for (i, key) in [&long_plain, &long_escaped].into_iter().enumerate() {
			storage.set_bytes(key, vec![i as u8]).await.unwrap();
			assert!(storage.exists(key).await.unwrap());
			assert_eq!(storage.get_bytes(key).await.unwrap(), vec![i as u8]);
		}
		storage.set_bytes("order_slots:short", vec![9]).await.unwrap();

		for entry in std::fs::read_dir(temp_dir.path()).unwrap() {
			let name = entry.unwrap().file_name();
			assert!(name.len() <= 255, "{:?} is too long", name);
		}

		let mut keys = storage.list_keys("order_slots:").await.unwrap();
		keys.sort();
		let mut expected = vec![
			long_escaped.clone(),
			long_plain.clone(),
			"order_slots:short".to_string(),
		];
		expected.sort();
		assert_eq!(keys, expected);

		storage.delete(&long_plain).await.unwrap();
		assert!(matches!(
			storage.get_bytes(&long_plain).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().join("slots"));

		assert!(!storage.exists("order_slots:alex").await.unwrap());
		assert!(storage.list_keys("").await.unwrap().is_empty());

		storage
			.set_bytes("order_slots:alex", b"{}".to_vec())
			.await
			.unwrap();
		assert!(storage.exists("order_slots:alex").await.unwrap());
		assert_eq!(
			storage.get_bytes("order_slots:alex").await.unwrap(),
			b"{}".to_vec()
		);

		storage.delete("order_slots:alex").await.unwrap();
		assert!(matches!(
			storage.get_bytes("order_slots:alex").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_persists_across_instances() {
		let temp_dir = TempDir::new().unwrap();

		let first = FileStorage::new(temp_dir.path().to_path_buf());
		first
			.set_bytes("order_slots:alex", b"saved".to_vec())
			.await
			.unwrap();
		drop(first);

		let second = FileStorage::new(temp_dir.path().to_path_buf());
		assert_eq!(
			second.get_bytes("order_slots:alex").await.unwrap(),
			b"saved".to_vec()
		);
		assert_eq!(
			second.list_keys("order_slots:").await.unwrap(),
			vec!["order_slots:alex".to_string()]
		);
	}

	#[tokio::test]
	async fn test_list_keys_ignores_foreign_files() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		storage.set_bytes("order_slots:a", vec![1]).await.unwrap();
		storage.set_bytes("other:b", vec![2]).await.unwrap();
		std::fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();

		let keys = storage.list_keys("order_slots:").await.unwrap();
		assert_eq!(keys, vec!["order_slots:a".to_string()]);
	}

	#[tokio::test]
	async fn test_rejects_file_without_header() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());
		std::fs::write(storage.get_file_path("order_slots:x"), b"garbage").unwrap();

		assert!(matches!(
			storage.get_bytes("order_slots:x").await,
			Err(StorageError::Backend(_))
		));
	}

	#[test]
	fn test_schema_rejects_empty_path() {
		let config: toml::Value = toml::from_str(r#"storage_path = """#).unwrap();
		assert!(FileStorageSchema.validate(&config).is_err());
		assert!(create_storage(&config).is_err());
	}
}
