//! Serde helpers for the hex-heavy delegation wire format.

/// `u64` written as a lowercase hex string; read from a hex string (optionally
/// `0x`-prefixed) or a plain JSON integer.
pub mod hex_u64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Integer(u64),
        Text(String),
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Integer(value) => Ok(value),
            Raw::Text(text) => {
                let digits = text.strip_prefix("0x").unwrap_or(&text);
                u64::from_str_radix(digits, 16).map_err(de::Error::custom)
            }
        }
    }
}

/// Optional list of byte strings, each hex encoded.
pub mod hex_list {
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Vec<Vec<u8>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(|items| items.iter().map(hex::encode).collect::<Vec<_>>())
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Vec<u8>>>, D::Error> {
        Option::<Vec<String>>::deserialize(deserializer)?
            .map(|items| {
                items
                    .iter()
                    .map(|item| hex::decode(item).map_err(de::Error::custom))
                    .collect()
            })
            .transpose()
    }
}
