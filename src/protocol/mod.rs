use serde::{Deserialize, Serialize};

use crate::core::domain::{ClientMeta, FileInfo};
use crate::core::error::ProtocolError;

/// Fixed protocol constant: bytes per `Chunk` payload (128 KiB)
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Which way a message may legally travel on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToUploader,
    ToDownloader,
}

/// The closed message union spoken over a peer data channel.
///
/// Encoded as externally tagged JSON; chunk bytes travel base64-encoded.
/// Every variant is valid in exactly one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum ProtocolMessage {
    /// Downloader introduces itself and asks for the catalog
    RequestInfo(ClientMeta),
    /// Uploader demands a password, optionally explaining a failed attempt
    PasswordRequired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
    /// Downloader submits a password candidate
    UsePassword { password: String },
    /// Uploader advertises its file catalog
    Info { files: Vec<FileInfo> },
    /// Downloader requests chunk emission from `offset`
    Start { file_name: String, offset: u64 },
    /// Downloader suspends the in-flight transfer
    Pause,
    /// One bounded byte range of a file
    Chunk {
        file_name: String,
        offset: u64,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        #[serde(rename = "final")]
        is_final: bool,
    },
    /// Downloader has everything it asked for
    Done,
    /// Kill switch broadcast to every open connection
    Report,
}

impl ProtocolMessage {
    pub fn direction(&self) -> Direction {
        match self {
            ProtocolMessage::RequestInfo(_)
            | ProtocolMessage::UsePassword { .. }
            | ProtocolMessage::Start { .. }
            | ProtocolMessage::Pause
            | ProtocolMessage::Done => Direction::ToUploader,
            ProtocolMessage::PasswordRequired { .. }
            | ProtocolMessage::Info { .. }
            | ProtocolMessage::Chunk { .. }
            | ProtocolMessage::Report => Direction::ToDownloader,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ProtocolMessage::RequestInfo(_) => "RequestInfo",
            ProtocolMessage::PasswordRequired { .. } => "PasswordRequired",
            ProtocolMessage::UsePassword { .. } => "UsePassword",
            ProtocolMessage::Info { .. } => "Info",
            ProtocolMessage::Start { .. } => "Start",
            ProtocolMessage::Pause => "Pause",
            ProtocolMessage::Chunk { .. } => "Chunk",
            ProtocolMessage::Done => "Done",
            ProtocolMessage::Report => "Report",
        }
    }
}

/// Encode a message into a wire frame
pub fn encode(message: &ProtocolMessage) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(|e| ProtocolError::Violation(format!("encode failed: {e}")))
}

/// Decode a wire frame, rejecting anything that does not match exactly one
/// known variant's required fields
pub fn decode(frame: &[u8]) -> Result<ProtocolMessage, ProtocolError> {
    serde_json::from_slice(frame)
        .map_err(|e| ProtocolError::Violation(format!("malformed message: {e}")))
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trips_with_base64_bytes() {
        let chunk = ProtocolMessage::Chunk {
            file_name: "photo.jpg".to_string(),
            offset: 131072,
            bytes: vec![0, 159, 146, 150],
            is_final: true,
        };
        let frame = encode(&chunk).unwrap();
        let text = String::from_utf8(frame.clone()).unwrap();
        assert!(text.contains("\"final\":true"), "{text}");
        assert!(!text.contains("159"), "bytes must not serialize as an array: {text}");
        assert_eq!(decode(&frame).unwrap(), chunk);
    }

    #[test]
    fn unknown_tag_is_a_violation() {
        let err = decode(br#"{"SelfDestruct":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn missing_required_field_is_a_violation() {
        let err = decode(br#"{"Start":{"file_name":"a.txt"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn unknown_extra_field_is_a_violation() {
        let err = decode(br#"{"Start":{"file_name":"a.txt","offset":0,"sneaky":1}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn trailing_garbage_is_a_violation() {
        let err = decode(br#"{"Pause":null}{"Done":null}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn optional_request_info_fields_may_be_absent() {
        let frame = br#"{"RequestInfo":{"browser_name":"Firefox","browser_version":"128","os_name":"Linux","os_version":"6.1"}}"#;
        let msg = decode(frame).unwrap();
        match msg {
            ProtocolMessage::RequestInfo(meta) => {
                assert_eq!(meta.browser_name, "Firefox");
                assert_eq!(meta.mobile_vendor, None);
            }
            other => panic!("decoded to wrong variant: {other:?}"),
        }
    }

    #[test]
    fn every_variant_has_exactly_one_direction() {
        let to_uploader = [
            ProtocolMessage::RequestInfo(ClientMeta::default()),
            ProtocolMessage::UsePassword { password: "pw".into() },
            ProtocolMessage::Start { file_name: "a".into(), offset: 0 },
            ProtocolMessage::Pause,
            ProtocolMessage::Done,
        ];
        for msg in &to_uploader {
            assert_eq!(msg.direction(), Direction::ToUploader, "{}", msg.tag());
        }
        let to_downloader = [
            ProtocolMessage::PasswordRequired { error_message: None },
            ProtocolMessage::Info { files: vec![] },
            ProtocolMessage::Chunk {
                file_name: "a".into(),
                offset: 0,
                bytes: vec![],
                is_final: true,
            },
            ProtocolMessage::Report,
        ];
        for msg in &to_downloader {
            assert_eq!(msg.direction(), Direction::ToDownloader, "{}", msg.tag());
        }
    }
}
