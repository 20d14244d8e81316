//! Revert decoding for the Ethereum relayer adapter.
//!
//! An `ErrorRepository` maps 4-byte error selectors to ABI error
//! definitions. It starts with the two errors the Solidity compiler emits
//! on its own and grows with the custom errors declared in contract
//! artifacts. Once built it is read-only and can be shared across tasks.

use alloy_dyn_abi::{DynSolValue, JsonAbiExt};
use alloy_json_abi::{Error as AbiError, JsonAbi, Param};
use alloy_primitives::Selector;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Signatures registered in every repository.
const BUILTIN_ERRORS: [&str; 2] = ["Error(string desc)", "Panic(uint256 code)"];

/// Errors that can occur while building the catalog or decoding reverts.
#[derive(Debug, Error)]
pub enum RevertError {
	#[error("Error data too short: {0} bytes")]
	TooShort(usize),
	#[error("Unknown error selector {0}")]
	UnknownSelector(Selector),
	#[error("Failed to decode {name}: {reason}")]
	Decode { name: String, reason: String },
	/// Two distinct signatures hash to the same selector.
	#[error("Selector {selector} collision: '{existing}' and '{new}'")]
	SelectorCollision {
		selector: Selector,
		existing: String,
		new: String,
	},
	#[error("Invalid artifact {path}: {reason}")]
	Artifact { path: String, reason: String },
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

/// A decoded revert, with arguments in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedError {
	pub name: String,
	pub arguments: Vec<(String, Value)>,
}

impl DecodedError {
	/// The arguments as a JSON object.
	pub fn arguments_json(&self) -> Value {
		Value::Object(self.arguments.iter().cloned().collect())
	}
}

/// Renders as `Name{"arg":value,...}`.
impl fmt::Display for DecodedError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{{", self.name)?;
		for (i, (key, value)) in self.arguments.iter().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}
			write!(f, "{}:{}", Value::String(key.clone()), value)?;
		}
		f.write_str("}")
	}
}

/// Selector-indexed catalog of ABI errors.
#[derive(Debug, Clone)]
pub struct ErrorRepository {
	entries: HashMap<Selector, AbiError>,
}

impl Default for ErrorRepository {
	fn default() -> Self {
		Self::new()
	}
}

impl ErrorRepository {
	/// Creates a repository holding only the built-in errors.
	pub fn new() -> Self {
		let mut repo = Self {
			entries: HashMap::new(),
		};
		for signature in BUILTIN_ERRORS {
			if let Ok(error) = AbiError::parse(signature) {
				repo.entries.insert(error.selector(), error);
			}
		}
		repo
	}

	/// Builds a repository from the built-ins plus every artifact found
	/// under `dirs`.
	pub fn from_artifact_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<Self, RevertError> {
		let mut repo = Self::new();
		for dir in dirs {
			let added = repo.load_dir(dir.as_ref())?;
			tracing::info!(dir = %dir.as_ref().display(), added, "Loaded contract errors");
		}
		Ok(repo)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, selector: &Selector) -> Option<&AbiError> {
		self.entries.get(selector)
	}

	/// Adds an error definition.
	///
	/// Re-adding an identical signature is a no-op. A different signature
	/// under an existing selector is rejected.
	pub fn add(&mut self, error: AbiError) -> Result<bool, RevertError> {
		self.insert(error.selector(), error)
	}

	fn insert(&mut self, selector: Selector, error: AbiError) -> Result<bool, RevertError> {
		match self.entries.get(&selector) {
			Some(existing) if existing.signature() == error.signature() => Ok(false),
			Some(existing) => Err(RevertError::SelectorCollision {
				selector,
				existing: existing.signature(),
				new: error.signature(),
			}),
			None => {
				self.entries.insert(selector, error);
				Ok(true)
			},
		}
	}

	/// Loads every `*.json` artifact under `dir`, recursively.
	///
	/// Returns the number of new entries.
	pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RevertError> {
		let mut added = 0;
		let mut pending = vec![dir.to_path_buf()];
		while let Some(current) = pending.pop() {
			let mut paths = std::fs::read_dir(&current)?
				.map(|entry| entry.map(|e| e.path()))
				.collect::<Result<Vec<PathBuf>, _>>()?;
			paths.sort();

			for path in paths {
				if path.is_dir() {
					pending.push(path);
				} else if path.extension().is_some_and(|ext| ext == "json") {
					added += self.load_artifact(&path)?;
				}
			}
		}
		Ok(added)
	}

	/// Loads the errors declared in one artifact's `abi` array.
	///
	/// Files without an `abi` key are skipped.
	pub fn load_artifact(&mut self, path: &Path) -> Result<usize, RevertError> {
		let artifact_error = |reason: String| RevertError::Artifact {
			path: path.display().to_string(),
			reason,
		};

		let content = std::fs::read_to_string(path)?;
		let mut value: Value =
			serde_json::from_str(&content).map_err(|e| artifact_error(e.to_string()))?;
		let Some(abi) = value.get_mut("abi").map(Value::take) else {
			tracing::debug!(path = %path.display(), "Skipping file without abi");
			return Ok(0);
		};
		let abi: JsonAbi = serde_json::from_value(abi).map_err(|e| artifact_error(e.to_string()))?;

		let mut added = 0;
		for error in abi.errors() {
			if self.add(error.clone())? {
				added += 1;
			}
		}
		Ok(added)
	}

	/// Decodes revert data into a structured error.
	pub fn decode_structured(&self, data: &[u8]) -> Result<DecodedError, RevertError> {
		if data.len() < 4 {
			return Err(RevertError::TooShort(data.len()));
		}
		let selector = Selector::from_slice(&data[..4]);
		let error = self
			.entries
			.get(&selector)
			.ok_or(RevertError::UnknownSelector(selector))?;

		let values =
			error
				.abi_decode_input(&data[4..], true)
				.map_err(|e| RevertError::Decode {
					name: error.name.clone(),
					reason: e.to_string(),
				})?;

		let arguments = error
			.inputs
			.iter()
			.zip(values.iter())
			.enumerate()
			.map(|(i, (param, value))| (param_key(&param.name, i), render(value, &param.components)))
			.collect();

		Ok(DecodedError {
			name: error.name.clone(),
			arguments,
		})
	}

	/// Decodes revert data into `Name{"arg":value,...}`.
	pub fn decode(&self, data: &[u8]) -> Result<String, RevertError> {
		self.decode_structured(data).map(|decoded| decoded.to_string())
	}
}

fn param_key(name: &str, index: usize) -> String {
	if name.is_empty() {
		format!("arg{}", index)
	} else {
		name.to_string()
	}
}

/// Converts a decoded value to JSON.
///
/// Integers that fit 64 bits become numbers, wider ones decimal strings.
/// Tuples with named components become objects.
fn render(value: &DynSolValue, components: &[Param]) -> Value {
	match value {
		DynSolValue::Bool(b) => Value::Bool(*b),
		DynSolValue::Uint(u, _) => {
			if u.bit_len() <= 64 {
				Value::from(u.to::<u64>())
			} else {
				Value::String(u.to_string())
			}
		},
		DynSolValue::Int(i, _) => {
			let text = i.to_string();
			match text.parse::<i64>() {
				Ok(small) => Value::from(small),
				Err(_) => Value::String(text),
			}
		},
		DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
		DynSolValue::FixedBytes(word, size) => {
			Value::String(format!("0x{}", hex_encode(&word[..*size])))
		},
		DynSolValue::Function(function) => Value::String(format!("0x{}", hex_encode(function.as_slice()))),
		DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex_encode(bytes))),
		DynSolValue::String(s) => Value::String(s.clone()),
		DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
			Value::Array(items.iter().map(|item| render(item, components)).collect())
		},
		DynSolValue::Tuple(items) => {
			if components.len() == items.len() {
				Value::Object(
					components
						.iter()
						.zip(items.iter())
						.enumerate()
						.map(|(i, (param, item))| {
							(param_key(&param.name, i), render(item, &param.components))
						})
						.collect(),
				)
			} else {
				Value::Array(items.iter().map(|item| render(item, &[])).collect())
			}
		},
		#[allow(unreachable_patterns)]
		other => Value::String(format!("{:?}", other)),
	}
}

fn hex_encode(bytes: &[u8]) -> String {
	alloy_primitives::hex::encode(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use alloy_sol_types::{sol, Panic, Revert, SolError};
	use tempfile::TempDir;

	sol! {
		error InsufficientBalance(uint256 available, uint256 required);
		error Unauthorized(address caller);
	}

	const ARTIFACT: &str = r#"{
		"contractName": "Vault",
		"abi": [
			{"type": "function", "name": "withdraw", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
			{"type": "error", "name": "InsufficientBalance", "inputs": [
				{"name": "available", "type": "uint256", "internalType": "uint256"},
				{"name": "required", "type": "uint256", "internalType": "uint256"}
			]},
			{"type": "error", "name": "Unauthorized", "inputs": [
				{"name": "caller", "type": "address", "internalType": "address"}
			]}
		]
	}"#;

	#[test]
	fn test_decode_builtin_error_string() {
		let repo = ErrorRepository::new();
		let data = Revert {
			reason: "Not enough Ether provided.".to_string(),
		}
		.abi_encode();

		assert_eq!(
			repo.decode(&data).unwrap(),
			r#"Error{"desc":"Not enough Ether provided."}"#
		);
	}

	#[test]
	fn test_decode_panic() {
		let repo = ErrorRepository::new();
		let data = Panic {
			code: U256::from(0x11),
		}
		.abi_encode();

		assert_eq!(repo.decode(&data).unwrap(), r#"Panic{"code":17}"#);
	}

	#[test]
	fn test_decode_is_idempotent() {
		let repo = ErrorRepository::new();
		let data = Revert {
			reason: "boom".to_string(),
		}
		.abi_encode();
		assert_eq!(repo.decode(&data).unwrap(), repo.decode(&data).unwrap());
	}

	#[test]
	fn test_short_and_unknown_data() {
		let repo = ErrorRepository::new();
		assert!(matches!(repo.decode(&[0x08, 0xc3]), Err(RevertError::TooShort(2))));

		let err = repo.decode(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
		assert!(matches!(err, RevertError::UnknownSelector(_)));
		assert!(err.to_string().contains("Unknown error selector"));
	}

	#[test]
	fn test_truncated_arguments_fail() {
		let repo = ErrorRepository::new();
		let data = Revert {
			reason: "boom".to_string(),
		}
		.abi_encode();
		let err = repo.decode(&data[..20]).unwrap_err();
		assert!(matches!(err, RevertError::Decode { ref name, .. } if name == "Error"));
	}

	#[test]
	fn test_same_signature_twice_is_accepted() {
		let mut repo = ErrorRepository::new();
		let before = repo.len();
		let error = AbiError::parse("Error(string reason)").unwrap();

		assert!(!repo.add(error.clone()).unwrap());
		assert!(!repo.add(error).unwrap());
		assert_eq!(repo.len(), before);
	}

	#[test]
	fn test_selector_collision_is_rejected() {
		let mut repo = ErrorRepository::new();
		let selector = AbiError::parse("Error(string desc)").unwrap().selector();
		let other = AbiError::parse("Other(uint8 code)").unwrap();

		let err = repo.insert(selector, other).unwrap_err();
		assert!(matches!(
			err,
			RevertError::SelectorCollision { ref existing, ref new, .. }
				if existing == "Error(string)" && new == "Other(uint8)"
		));
	}

	#[test]
	fn test_load_artifacts_recursively() {
		let dir = TempDir::new().unwrap();
		let nested = dir.path().join("Vault.sol");
		std::fs::create_dir_all(&nested).unwrap();
		std::fs::write(nested.join("Vault.json"), ARTIFACT).unwrap();
		std::fs::write(dir.path().join("build-info.json"), r#"{"id": "abc"}"#).unwrap();
		std::fs::write(dir.path().join("notes.txt"), "not an artifact").unwrap();

		let repo = ErrorRepository::from_artifact_dirs(&[dir.path()]).unwrap();
		assert_eq!(repo.len(), 4);

		let data = InsufficientBalance {
			available: U256::from(5),
			required: U256::MAX,
		}
		.abi_encode();
		assert_eq!(
			repo.decode(&data).unwrap(),
			format!(
				r#"InsufficientBalance{{"available":5,"required":"{}"}}"#,
				U256::MAX
			)
		);

		let caller = alloy_primitives::address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
		let decoded = repo
			.decode_structured(&Unauthorized { caller }.abi_encode())
			.unwrap();
		assert_eq!(decoded.name, "Unauthorized");
		assert_eq!(
			decoded.arguments_json()["caller"],
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
		);
	}

	#[test]
	fn test_loading_same_artifact_twice_is_idempotent() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("a.json"), ARTIFACT).unwrap();
		std::fs::write(dir.path().join("b.json"), ARTIFACT).unwrap();

		let repo = ErrorRepository::from_artifact_dirs(&[dir.path()]).unwrap();
		assert_eq!(repo.len(), 4);
	}

	#[test]
	fn test_malformed_artifact_fails() {
		let dir = TempDir::new().unwrap();
		std::fs::write(dir.path().join("bad.json"), r#"{"abi": "nope"}"#).unwrap();

		let err = ErrorRepository::from_artifact_dirs(&[dir.path()]).unwrap_err();
		assert!(matches!(err, RevertError::Artifact { .. }));
	}

	#[test]
	fn test_unnamed_arguments_get_positional_keys() {
		let mut repo = ErrorRepository::new();
		repo.add(AbiError::parse("Failed(uint64,bool)").unwrap()).unwrap();

		let selector = AbiError::parse("Failed(uint64,bool)").unwrap().selector();
		let mut data = selector.to_vec();
		data.extend(DynSolValue::Tuple(vec![
			DynSolValue::Uint(U256::from(9), 64),
			DynSolValue::Bool(true),
		])
		.abi_encode_params());

		assert_eq!(repo.decode(&data).unwrap(), r#"Failed{"arg0":9,"arg1":true}"#);
	}
}
