//! Wei amounts written either as TOML integers or decimal strings.
//!
//! TOML integers stop at `i64::MAX`, which is about 9.2 ether, so larger
//! amounts are accepted as strings.

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWei {
	Int(i64),
	Str(String),
}

impl RawWei {
	fn into_wei<E: de::Error>(self) -> Result<u128, E> {
		match self {
			RawWei::Int(v) => u128::try_from(v)
				.map_err(|_| E::custom(format!("wei amount cannot be negative: {}", v))),
			RawWei::Str(s) => s
				.trim()
				.parse::<u128>()
				.map_err(|e| E::custom(format!("invalid wei amount '{}': {}", s, e))),
		}
	}
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
	D: Deserializer<'de>,
{
	RawWei::deserialize(deserializer)?.into_wei()
}

pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
where
	D: Deserializer<'de>,
{
	Option::<RawWei>::deserialize(deserializer)?
		.map(RawWei::into_wei)
		.transpose()
}
