//! Serde adapters for the wire encodings used across CipherBox documents
//!
//! IVs and wrapped keys travel as lowercase hex, AEAD ciphertexts as standard
//! (padded, non-url-safe) base64. Mixing them up breaks interoperability.

/// `Vec<u8>` as standard base64
pub mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

/// `Vec<u8>` as lowercase hex
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Fixed-size byte array as lowercase hex
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        d: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(d)?;
        let vec = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if vec.len() != N {
            return Err(serde::de::Error::custom(format!(
                "expected {} bytes, got {}",
                N,
                vec.len()
            )));
        }
        let mut arr = [0u8; N];
        arr.copy_from_slice(&vec);
        Ok(arr)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        #[serde(with = "super::hex_array")]
        iv: [u8; 4],
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
        #[serde(with = "super::hex_bytes")]
        wrapped: Vec<u8>,
    }

    #[test]
    fn test_encodings_are_not_mixed() {
        let sample = Sample {
            iv: [0xde, 0xad, 0xbe, 0xef],
            data: vec![0xfb, 0xff],
            wrapped: vec![0x01, 0xab],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"iv":"deadbeef","data":"+/8=","wrapped":"01ab"}"#);
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_hex_array_length_checked() {
        let result: Result<Sample, _> =
            serde_json::from_str(r#"{"iv":"deadbe","data":"","wrapped":""}"#);
        assert!(result.is_err());
    }
}
