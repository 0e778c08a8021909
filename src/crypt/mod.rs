pub mod cipher;
pub mod encoding;

use crate::config::GbdbConfig;
use crate::error::GbdbError;
use cipher::Cipher;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serializes table documents and append-log lines, passing them through
/// the [`Cipher`] when encryption is enabled. Whole documents are encrypted
/// as one opaque token; log lines are encrypted individually so corruption
/// of one line does not invalidate the others.
pub struct Codec {
    cipher: Option<Cipher>,
    pretty: bool,
}

impl Codec {
    pub fn new(config: &GbdbConfig) -> Result<Self, GbdbError> {
        let cipher = if config.encrypt {
            let secret = config.secret_bytes().ok_or_else(|| GbdbError::InvalidConfig {
                message: "encryption enabled but no secret configured".into(),
            })?;
            Some(Cipher::new(secret, config.legacy_decode)?)
        } else {
            None
        };
        Ok(Self {
            cipher,
            pretty: config.pretty,
        })
    }

    /// Encodes a whole-file document (base snapshot, meta, name index).
    pub fn encode_doc<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, GbdbError> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| GbdbError::Encode(e.to_string()))?;

        match &self.cipher {
            Some(cipher) => Ok(cipher.encode(json.as_bytes())?.into_bytes()),
            None => Ok(json.into_bytes()),
        }
    }

    pub fn decode_doc<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, GbdbError> {
        let plaintext = match &self.cipher {
            Some(cipher) => {
                let token = std::str::from_utf8(bytes).map_err(|_| GbdbError::Tampered {
                    message: "encrypted document is not valid UTF-8".into(),
                })?;
                cipher.decode(token.trim())?
            }
            None => bytes.to_vec(),
        };
        serde_json::from_slice(&plaintext).map_err(|e| GbdbError::Decode(e.to_string()))
    }

    /// Encodes one append-log entry as a single line (no trailing newline).
    pub fn encode_line<T: Serialize>(&self, value: &T) -> Result<String, GbdbError> {
        let json = serde_json::to_string(value).map_err(|e| GbdbError::Encode(e.to_string()))?;
        match &self.cipher {
            Some(cipher) => cipher.encode(json.as_bytes()),
            None => Ok(json),
        }
    }

    pub fn decode_line<T: DeserializeOwned>(&self, line: &str) -> Result<T, GbdbError> {
        let plaintext = match &self.cipher {
            Some(cipher) => cipher.decode(line.trim())?,
            None => line.as_bytes().to_vec(),
        };
        serde_json::from_slice(&plaintext).map_err(|e| GbdbError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::Codec;
    use crate::config::GbdbConfig;
    use serde_json::json;

    #[test]
    fn plain_doc_is_readable_json() {
        let codec = Codec::new(&GbdbConfig::plain("x")).expect("codec");
        let bytes = codec.encode_doc(&json!([{"id": -1}])).expect("encode");
        assert_eq!(String::from_utf8_lossy(&bytes), r#"[{"id":-1}]"#);
    }

    #[test]
    fn encrypted_doc_roundtrips_and_hides_content() {
        let codec = Codec::new(&GbdbConfig::encrypted("x", "k")).expect("codec");
        let doc = json!([{"id": -1, "name": "-header-"}, {"id": 0, "name": "Ann"}]);
        let bytes = codec.encode_doc(&doc).expect("encode");
        assert!(!String::from_utf8_lossy(&bytes).contains("Ann"));
        let decoded: serde_json::Value = codec.decode_doc(&bytes).expect("decode");
        assert_eq!(decoded, doc);
    }

    #[test]
    fn lines_are_independently_decodable() {
        let codec = Codec::new(&GbdbConfig::encrypted("x", "k")).expect("codec");
        let a = codec.encode_line(&json!({"op": "del", "id": 3})).expect("line");
        let b = codec.encode_line(&json!({"op": "del", "id": 4})).expect("line");
        assert!(!a.contains('\n') && !b.contains('\n'));
        let decoded: serde_json::Value = codec.decode_line(&b).expect("decode");
        assert_eq!(decoded["id"], 4);
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let mut cfg = GbdbConfig::plain("x");
        cfg.encrypt = true;
        assert!(Codec::new(&cfg).is_err());
    }
}
