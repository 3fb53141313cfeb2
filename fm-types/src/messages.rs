//! Protocol messages for the relay hub.
//!
//! Inbound frames are decoded once, at the connection boundary, into a per-peer
//! sum type. Anything the hub routes or forwards stays an untouched [`Payload`]
//! so command-specific fields pass through verbatim.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{DeviceId, DeviceSummary, MessageError};

/// A JSON object as received from or delivered to a peer.
pub type Payload = serde_json::Map<String, Value>;

/// Commands an admin may address to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `list_files`
    ListFiles,
    /// `download_file`
    DownloadFile,
    /// `upload_file`
    UploadFile,
    /// `delete`
    Delete,
    /// `create_dir`
    CreateDir,
    /// `move`
    Move,
    /// `compress`
    Compress,
    /// `get_device_info`
    GetDeviceInfo,
}

impl CommandKind {
    /// Every routable command.
    pub const ALL: [CommandKind; 8] = [
        CommandKind::ListFiles,
        CommandKind::DownloadFile,
        CommandKind::UploadFile,
        CommandKind::Delete,
        CommandKind::CreateDir,
        CommandKind::Move,
        CommandKind::Compress,
        CommandKind::GetDeviceInfo,
    ];

    /// Look up a command by its wire `type` value.
    pub fn from_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// Wire `type` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListFiles => "list_files",
            Self::DownloadFile => "download_file",
            Self::UploadFile => "upload_file",
            Self::Delete => "delete",
            Self::CreateDir => "create_dir",
            Self::Move => "move",
            Self::Compress => "compress",
            Self::GetDeviceInfo => "get_device_info",
        }
    }
}

/// Registration sent by a device as its first message.
///
/// Every field is optional. Devices report `sdk_version` as an integer, so
/// scalar values of any JSON type are accepted and kept as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceRegister {
    /// Identifier the device wants to be known by.
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    /// Human-readable name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_name: Option<String>,
    /// OS release.
    #[serde(default, deserialize_with = "lenient_string")]
    pub android_version: Option<String>,
    /// OS API level.
    #[serde(default, deserialize_with = "lenient_string")]
    pub sdk_version: Option<String>,
    /// Opaque credential, stored but never checked by the hub.
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_key: Option<String>,
}

impl DeviceRegister {
    /// The requested id, if one was supplied and is not empty.
    pub fn requested_id(&self) -> Option<DeviceId> {
        self.device_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(DeviceId::from)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// A decoded frame from a device connection.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceInbound {
    /// `device_register`
    Register(DeviceRegister),
    /// Anything else; forwarded to admins as-is.
    Message(Payload),
}

impl DeviceInbound {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, MessageError> {
        let object = decode_object(text)?;
        if message_type(&object) == Some("device_register") {
            let register = serde_json::from_value(Value::Object(object))?;
            Ok(Self::Register(register))
        } else {
            Ok(Self::Message(object))
        }
    }
}

/// A routable admin command.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminCommand {
    /// Which command this is.
    pub kind: CommandKind,
    /// Addressed device, if the admin named one.
    pub device_id: Option<DeviceId>,
    /// The complete original message, delivered to the device unmodified.
    pub payload: Payload,
}

/// A decoded frame from an admin connection.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminInbound {
    /// One of the [`CommandKind`] types.
    Command(AdminCommand),
    /// A `type` the hub does not route.
    Unrecognized {
        /// The `type` value received.
        kind: String,
    },
}

impl AdminInbound {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, MessageError> {
        let payload = decode_object(text)?;
        let kind = message_type(&payload).ok_or(MessageError::MissingType)?;

        let Some(kind) = CommandKind::from_type(kind) else {
            return Ok(Self::Unrecognized {
                kind: kind.to_string(),
            });
        };

        let device_id = payload.get("device_id").and_then(lenient_id);

        Ok(Self::Command(AdminCommand {
            kind,
            device_id,
            payload,
        }))
    }
}

/// Messages originated by the hub itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to a device once it is admitted.
    Registered {
        /// The id the device is now known by.
        device_id: DeviceId,
    },
    /// Full device snapshot for admins.
    ConnectionsUpdate {
        /// Every known device.
        connections: Vec<DeviceSummary>,
    },
    /// Sent to an admin whose command could not be routed.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

/// Decode a frame from a registered device.
///
/// Once registered, every object is opaque, `device_register` included.
pub fn decode_payload(text: &str) -> Result<Payload, MessageError> {
    decode_object(text)
}

/// Read an addressed device id the same way registration reads one.
fn lenient_id(value: &Value) -> Option<DeviceId> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(DeviceId::from(s.as_str())),
        other => Some(DeviceId::from(other.to_string())),
    }
}

fn decode_object(text: &str) -> Result<Payload, MessageError> {
    match serde_json::from_str(text)? {
        Value::Object(object) => Ok(object),
        _ => Err(MessageError::NotAnObject),
    }
}

fn message_type(object: &Payload) -> Option<&str> {
    object.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceStatus;
    use serde_json::json;

    #[test]
    fn command_kinds_match_wire_names() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_type(kind.as_str()), Some(kind));
        }
        assert_eq!(CommandKind::from_type("file_list"), None);
        assert_eq!(CommandKind::from_type("LIST_FILES"), None);
    }

    #[test]
    fn decode_registration_with_numeric_sdk() {
        let text = r#"{"type":"device_register","device_id":"dev1","device_name":"Pixel","android_version":"14","sdk_version":34,"api_key":"k"}"#;
        let DeviceInbound::Register(register) = DeviceInbound::decode(text).unwrap() else {
            panic!("Expected registration");
        };
        assert_eq!(register.requested_id(), Some(DeviceId::from("dev1")));
        assert_eq!(register.device_name.as_deref(), Some("Pixel"));
        assert_eq!(register.sdk_version.as_deref(), Some("34"));
        assert_eq!(register.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn registration_fields_are_optional() {
        let DeviceInbound::Register(register) =
            DeviceInbound::decode(r#"{"type":"device_register"}"#).unwrap()
        else {
            panic!("Expected registration");
        };
        assert_eq!(register, DeviceRegister::default());
        assert_eq!(register.requested_id(), None);
    }

    #[test]
    fn empty_device_id_is_not_requested() {
        let register = DeviceRegister {
            device_id: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(register.requested_id(), None);
    }

    #[test]
    fn device_payload_kept_verbatim() {
        let text = r#"{"type":"file_list","files":[{"name":"a"}],"path":"/"}"#;
        let DeviceInbound::Message(payload) = DeviceInbound::decode(text).unwrap() else {
            panic!("Expected payload");
        };
        assert_eq!(Value::Object(payload), serde_json::from_str::<Value>(text).unwrap());
    }

    #[test]
    fn device_message_without_type_is_still_a_payload() {
        let decoded = DeviceInbound::decode(r#"{"files":[]}"#).unwrap();
        assert!(matches!(decoded, DeviceInbound::Message(_)));
    }

    #[test]
    fn non_object_frames_rejected() {
        assert!(matches!(
            DeviceInbound::decode("[1,2]"),
            Err(MessageError::NotAnObject)
        ));
        assert!(matches!(
            AdminInbound::decode("not json"),
            Err(MessageError::Json(_))
        ));
    }

    #[test]
    fn decode_admin_command() {
        let text = r#"{"type":"list_files","device_id":"dev1","path":"/sdcard"}"#;
        let AdminInbound::Command(cmd) = AdminInbound::decode(text).unwrap() else {
            panic!("Expected command");
        };
        assert_eq!(cmd.kind, CommandKind::ListFiles);
        assert_eq!(cmd.device_id, Some(DeviceId::from("dev1")));
        assert_eq!(cmd.payload["path"], "/sdcard");
        assert_eq!(cmd.payload.len(), 3);
    }

    #[test]
    fn admin_command_without_device_id() {
        let AdminInbound::Command(cmd) = AdminInbound::decode(r#"{"type":"move"}"#).unwrap() else {
            panic!("Expected command");
        };
        assert_eq!(cmd.kind, CommandKind::Move);
        assert_eq!(cmd.device_id, None);
    }

    #[test]
    fn numeric_admin_device_id_matches_registration() {
        let DeviceInbound::Register(register) =
            DeviceInbound::decode(r#"{"type":"device_register","device_id":5}"#).unwrap()
        else {
            panic!("Expected registration");
        };
        let AdminInbound::Command(cmd) =
            AdminInbound::decode(r#"{"type":"list_files","device_id":5}"#).unwrap()
        else {
            panic!("Expected command");
        };
        assert_eq!(cmd.device_id, register.requested_id());
        assert_eq!(cmd.device_id, Some(DeviceId::from("5")));
        assert_eq!(cmd.payload["device_id"], 5);
    }

    #[test]
    fn null_admin_device_id_is_absent() {
        let AdminInbound::Command(cmd) =
            AdminInbound::decode(r#"{"type":"delete","device_id":null}"#).unwrap()
        else {
            panic!("Expected command");
        };
        assert_eq!(cmd.device_id, None);
    }

    #[test]
    fn registered_device_frames_are_opaque() {
        let text = r#"{"type":"device_register","device_id":"dev1","note":"again"}"#;
        let payload = decode_payload(text).unwrap();
        assert_eq!(Value::Object(payload), serde_json::from_str::<Value>(text).unwrap());
        assert!(matches!(decode_payload("42"), Err(MessageError::NotAnObject)));
    }

    #[test]
    fn unknown_admin_type_is_unrecognized() {
        let decoded = AdminInbound::decode(r#"{"type":"reboot","device_id":"dev1"}"#).unwrap();
        assert_eq!(
            decoded,
            AdminInbound::Unrecognized {
                kind: "reboot".to_string()
            }
        );
    }

    #[test]
    fn admin_message_without_type() {
        assert!(matches!(
            AdminInbound::decode(r#"{"device_id":"dev1"}"#),
            Err(MessageError::MissingType)
        ));
        assert!(matches!(
            AdminInbound::decode(r#"{"type":7}"#),
            Err(MessageError::MissingType)
        ));
    }

    #[test]
    fn server_messages_are_tagged() {
        let registered = ServerMessage::Registered {
            device_id: DeviceId::from("dev1"),
        };
        assert_eq!(
            serde_json::to_value(&registered).unwrap(),
            json!({"type": "registered", "device_id": "dev1"})
        );

        let error = ServerMessage::Error {
            message: "Device dev2 not connected".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "message": "Device dev2 not connected"})
        );

        let update = ServerMessage::ConnectionsUpdate {
            connections: vec![DeviceSummary {
                id: DeviceId::from("dev1"),
                ip: "127.0.0.1".to_string(),
                device_name: "Pixel".to_string(),
                android_version: "14".to_string(),
                connected_at: "2024-01-01 00:00:00".to_string(),
                status: DeviceStatus::Offline,
            }],
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["type"], "connections_update");
        assert_eq!(value["connections"][0]["status"], "offline");
    }
}
