//! URN encoding of object identifiers.
//!
//! Conversion jobs identify their source by the URL-safe, unpadded base64
//! form of the store's object id.

use data_encoding::BASE64URL_NOPAD;

use super::error::RemoteError;

/// Encode an object id as a job-submission URN.
pub fn encode_urn(object_id: &str) -> String {
    BASE64URL_NOPAD.encode(object_id.as_bytes())
}

/// Decode a URN back to the object id.
pub fn decode_urn(urn: &str) -> Result<String, RemoteError> {
    let bytes = BASE64URL_NOPAD
        .decode(urn.trim_end_matches('=').as_bytes())
        .map_err(|e| RemoteError::Protocol(format!("invalid URN {urn}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| RemoteError::Protocol(format!("invalid URN {urn}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_without_padding() {
        let urn = encode_urn("urn:ferry:objects:bucket/a.stp");
        assert!(!urn.contains('='));
        assert!(!urn.contains('+') && !urn.contains('/'));
        assert_eq!(decode_urn(&urn).unwrap(), "urn:ferry:objects:bucket/a.stp");
    }

    #[test]
    fn known_value() {
        assert_eq!(encode_urn("ab"), "YWI");
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_urn("not base64!").is_err());
    }
}
