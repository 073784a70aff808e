//! Wire codec for the Deako local hub protocol.
//!
//! Every message is a single JSON object terminated by `\r\n`:
//!
//! ```text
//! {"transactionId":"…","type":"DEVICE_LIST","dst":"deako","src":"my-app"}\r\n
//! ```
//!
//! Requests carry a fresh `transactionId` (UUID v4), the message `type`, the
//! fixed destination `deako` and the client name as `src`. Replies and pushes
//! from the hub carry their payload under `data`.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::device::DeviceState;
use crate::errors::Error;
use crate::types::Dim;

type Result<T> = std::result::Result<T, Error>;

/// Frame terminator used by the hub.
pub const DELIMITER: &[u8] = b"\r\n";

/// Destination field of every request.
const DESTINATION: &str = "deako";

/// Message type names used on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumString, Display, AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Device enumeration request, and the hub's count reply.
    DeviceList,
    /// One discovered device.
    DeviceFound,
    /// Unsolicited state change push.
    Event,
    /// Device control request, and the hub's acknowledgment.
    Control,
}

/// A request sent to the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask the hub to enumerate every device it knows.
    DeviceList,
    /// Set the power and dim level of one device.
    Control { target: String, power: bool, dim: Dim },
}

#[serde_with::skip_serializing_none]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    transaction_id: Uuid,
    #[serde(rename = "type")]
    kind: MessageKind,
    dst: &'a str,
    src: &'a str,
    data: Option<ControlData<'a>>,
}

#[derive(Serialize)]
struct ControlData<'a> {
    target: &'a str,
    state: ControlState,
}

#[derive(Serialize)]
struct ControlState {
    power: bool,
    dim: Dim,
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::DeviceList => MessageKind::DeviceList,
            Request::Control { .. } => MessageKind::Control,
        }
    }

    /// Build the JSON envelope for this request.
    pub fn to_json(&self, src: &str, transaction_id: Uuid) -> Result<Value> {
        let data = match self {
            Request::DeviceList => None,
            Request::Control { target, power, dim } => Some(ControlData {
                target,
                state: ControlState {
                    power: *power,
                    dim: *dim,
                },
            }),
        };
        let envelope = Envelope {
            transaction_id,
            kind: self.kind(),
            dst: DESTINATION,
            src,
            data,
        };
        serde_json::to_value(envelope).map_err(Error::JsonDump)
    }

    /// Encode this request as one delimited wire frame.
    pub fn encode(&self, src: &str, transaction_id: Uuid) -> Result<Vec<u8>> {
        encode_line(&self.to_json(src, transaction_id)?)
    }
}

/// Serialize a JSON message and append the frame delimiter.
pub fn encode_line(message: &Value) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message).map_err(Error::JsonDump)?;
    bytes.extend_from_slice(DELIMITER);
    Ok(bytes)
}

/// A decoded frame received from the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frame {
    /// Discovery batch header announcing how many `DeviceFound` frames follow.
    DeviceList { count: usize },
    /// Discovery reply for one device.
    DeviceFound {
        uuid: String,
        name: String,
        state: DeviceState,
    },
    /// Unsolicited state change.
    #[serde(rename = "EVENT")]
    StateChanged { uuid: String, state: DeviceState },
    /// Acknowledgment of a control request carrying the resulting state.
    #[serde(rename = "CONTROL")]
    ControlAck { uuid: String, state: DeviceState },
    /// A well-formed frame of a type this client does not act on.
    Other { kind: String },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct DeviceListData {
    number_of_devices: usize,
}

#[derive(Deserialize)]
struct DeviceFoundData {
    uuid: String,
    name: String,
    state: DeviceState,
}

#[derive(Deserialize)]
struct TargetStateData {
    target: String,
    state: DeviceState,
}

impl Frame {
    /// The wire message type, if this is a frame the client understands.
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Frame::DeviceList { .. } => Some(MessageKind::DeviceList),
            Frame::DeviceFound { .. } => Some(MessageKind::DeviceFound),
            Frame::StateChanged { .. } => Some(MessageKind::Event),
            Frame::ControlAck { .. } => Some(MessageKind::Control),
            Frame::Other { .. } => None,
        }
    }

    /// Decode a single frame body (without its delimiter).
    pub fn decode(line: &[u8]) -> Result<Frame> {
        let text = std::str::from_utf8(line).map_err(Error::Utf8Decode)?;
        let raw: RawFrame = serde_json::from_str(text).map_err(Error::JsonLoad)?;

        let Ok(kind) = MessageKind::from_str(&raw.kind) else {
            return Ok(Frame::Other { kind: raw.kind });
        };

        match kind {
            MessageKind::DeviceList => {
                let data: DeviceListData = data_as(raw.data, kind)?;
                Ok(Frame::DeviceList {
                    count: data.number_of_devices,
                })
            }
            MessageKind::DeviceFound => {
                let data: DeviceFoundData = data_as(raw.data, kind)?;
                Ok(Frame::DeviceFound {
                    uuid: data.uuid,
                    name: data.name,
                    state: data.state,
                })
            }
            MessageKind::Event => {
                let data: TargetStateData = data_as(raw.data, kind)?;
                Ok(Frame::StateChanged {
                    uuid: data.target,
                    state: data.state,
                })
            }
            // Acks without a state body carry nothing to apply.
            MessageKind::Control => match data_as::<TargetStateData>(raw.data, kind) {
                Ok(data) => Ok(Frame::ControlAck {
                    uuid: data.target,
                    state: data.state,
                }),
                Err(_) => Ok(Frame::Other { kind: raw.kind }),
            },
        }
    }
}

fn data_as<T: DeserializeOwned>(data: Option<Value>, kind: MessageKind) -> Result<T> {
    let data = data.ok_or_else(|| Error::protocol(format!("{kind} frame without data")))?;
    serde_json::from_value(data).map_err(|e| Error::protocol(format!("invalid {kind} frame: {e}")))
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and pull complete frames with
/// [`FrameDecoder::next_frame`]. A malformed line only costs that line; the
/// decoder resumes at the next delimiter. A line that grows past the size
/// limit cannot be resynchronized and is reported as [`Error::FrameTooLong`].
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

    pub fn new() -> Self {
        Self::with_max_frame_len(Self::DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Buffer bytes read from the connection.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let Some(end) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > self.max_frame_len {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Some(Err(Error::FrameTooLong {
                        len,
                        max: self.max_frame_len,
                    }));
                }
                return None;
            };

            let line: Vec<u8> = self.buf.drain(..=end).collect();
            let body = trim_line(&line);
            if body.is_empty() {
                continue;
            }
            return Some(Frame::decode(body));
        }
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.trim_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXN: &str = "015c44d3-abec-4be0-bb0d-34adb4b81559";

    fn txn() -> Uuid {
        Uuid::parse_str(TXN).unwrap()
    }

    fn control_request() -> Request {
        Request::Control {
            target: "A".into(),
            power: true,
            dim: Dim::create(80).unwrap(),
        }
    }

    fn drain(decoder: &mut FrameDecoder) -> Vec<Result<Frame>> {
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn test_encode_device_list() {
        let bytes = Request::DeviceList.encode("Home", txn()).unwrap();
        assert!(bytes.ends_with(DELIMITER));

        let value: Value = serde_json::from_slice(&bytes[..bytes.len() - 2]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "transactionId": TXN,
                "type": "DEVICE_LIST",
                "dst": "deako",
                "src": "Home",
            })
        );
    }

    #[test]
    fn test_encode_control() {
        let value = control_request().to_json("Home", txn()).unwrap();
        assert_eq!(value["type"], "CONTROL");
        assert_eq!(value["dst"], "deako");
        assert_eq!(value["data"]["target"], "A");
        assert_eq!(value["data"]["state"]["power"], true);
        assert_eq!(value["data"]["state"]["dim"], 80);
    }

    #[test]
    fn test_decode_discovery_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(
            b"{\"type\":\"DEVICE_LIST\",\"data\":{\"number_of_devices\":2}}\r\n\
              {\"type\":\"DEVICE_FOUND\",\"data\":{\"name\":\"Lamp\",\"uuid\":\"A\",\"state\":{\"power\":false}}}\r\n\
              {\"type\":\"DEVICE_FOUND\",\"data\":{\"name\":\"Strip\",\"uuid\":\"B\",\"state\":{\"power\":true,\"dim\":50}}}\r\n",
        );

        let frames: Vec<Frame> = drain(&mut decoder).into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(
            frames,
            vec![
                Frame::DeviceList { count: 2 },
                Frame::DeviceFound {
                    uuid: "A".into(),
                    name: "Lamp".into(),
                    state: DeviceState::new(false, None),
                },
                Frame::DeviceFound {
                    uuid: "B".into(),
                    name: "Strip".into(),
                    state: DeviceState::new(true, Dim::create(50)),
                },
            ]
        );
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_decode_event() {
        let frame = Frame::decode(
            br#"{"type":"EVENT","data":{"target":"A","state":{"power":true,"dim":80}}}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            Frame::StateChanged {
                uuid: "A".into(),
                state: DeviceState::new(true, Dim::create(80)),
            }
        );
        assert_eq!(frame.kind(), Some(MessageKind::Event));
    }

    #[test]
    fn test_control_ack_without_state_is_ignored() {
        let frame = Frame::decode(br#"{"type":"CONTROL","status":"ok"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Other {
                kind: "CONTROL".into()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let frame = Frame::decode(br#"{"type":"PING"}"#).unwrap();
        assert_eq!(frame, Frame::Other { kind: "PING".into() });
        assert_eq!(frame.kind(), None);
    }

    #[test]
    fn test_split_control_frame_reassembly() {
        let encoded = control_request().encode("Home", txn()).unwrap();

        let mut whole = FrameDecoder::new();
        whole.feed(&encoded);
        let expected = whole.next_frame().unwrap().unwrap();
        assert_eq!(
            expected,
            Frame::ControlAck {
                uuid: "A".into(),
                state: DeviceState::new(true, Dim::create(80)),
            }
        );

        for split in 1..encoded.len() {
            let mut decoder = FrameDecoder::new();
            decoder.feed(&encoded[..split]);
            assert!(decoder.next_frame().is_none(), "frame emitted early at {split}");
            decoder.feed(&encoded[split..]);
            assert_eq!(decoder.next_frame().unwrap().unwrap(), expected);
            assert!(decoder.next_frame().is_none());
        }
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"{not json}\r\n{\"type\":\"EVENT\",\"data\":{\"target\":\"A\",\"state\":{\"power\":false}}}\r\n");

        let first = decoder.next_frame().unwrap();
        assert!(first.unwrap_err().is_protocol());
        let second = decoder.next_frame().unwrap().unwrap();
        assert_eq!(second.kind(), Some(MessageKind::Event));
    }

    #[test]
    fn test_missing_fields_is_protocol_error() {
        let err = Frame::decode(br#"{"type":"DEVICE_FOUND","data":{"uuid":"A"}}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        let err = Frame::decode(br#"{"type":"EVENT"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_bare_newline_and_blank_lines() {
        let mut decoder = FrameDecoder::new();
        decoder.feed(b"\r\n\n{\"type\":\"DEVICE_LIST\",\"data\":{\"number_of_devices\":0}}\n");
        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap(), &Frame::DeviceList { count: 0 });
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let mut decoder = FrameDecoder::with_max_frame_len(16);
        decoder.feed(&[b'x'; 32]);
        let err = decoder.next_frame().unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_message_kind_names() {
        assert_eq!(MessageKind::DeviceList.to_string(), "DEVICE_LIST");
        assert_eq!(MessageKind::DeviceFound.as_ref(), "DEVICE_FOUND");
        assert_eq!(MessageKind::from_str("EVENT").unwrap(), MessageKind::Event);
        assert!(MessageKind::from_str("PING").is_err());
    }
}
