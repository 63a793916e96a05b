//! Live protocol wire format
//!
//! Every frame is a 2-byte big-endian message type followed by a protobuf
//! body. Types are partitioned so a receiver can route on the header alone:
//!
//! - `0x0000..0x00FF` liveness (`PING`, `PONG`)
//! - `0x0100..0x0FFF` server push (`MATRIX_UPDATE_MESSAGE`)
//! - `0x1000..` request/response pairs, response = request + 1

use prost::Message;

use super::bucket::{BucketKey, MatrixElement, MatrixSegment};
use crate::types::{DroplineError, Result};

/// Header size in bytes
pub const HDR_SIZE: usize = 2;

const PUSH_BASE: u16 = 1 << 8;
const REQUEST_BASE: u16 = 1 << 12;

/// Message type discriminant carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Unknown = 0,
    Ping = 1,
    Pong = 2,
    MatrixUpdateMessage = PUSH_BASE + 1,
    MatrixUpdateSubscribeReq = REQUEST_BASE + 1,
    MatrixUpdateSubscribeResp = REQUEST_BASE + 2,
    MatrixUpdateUnsubscribeReq = REQUEST_BASE + 3,
    MatrixUpdateUnsubscribeResp = REQUEST_BASE + 4,
}

/// Purpose of a message type, derived from its range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    Liveness,
    Push,
    Request,
    Response,
}

impl MessageType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Ping),
            2 => Some(Self::Pong),
            v if v == PUSH_BASE + 1 => Some(Self::MatrixUpdateMessage),
            v if v == REQUEST_BASE + 1 => Some(Self::MatrixUpdateSubscribeReq),
            v if v == REQUEST_BASE + 2 => Some(Self::MatrixUpdateSubscribeResp),
            v if v == REQUEST_BASE + 3 => Some(Self::MatrixUpdateUnsubscribeReq),
            v if v == REQUEST_BASE + 4 => Some(Self::MatrixUpdateUnsubscribeResp),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Route by range alone; works for values this build does not know
    pub fn category_of(value: u16) -> MessageCategory {
        if value < PUSH_BASE {
            MessageCategory::Liveness
        } else if value < REQUEST_BASE {
            MessageCategory::Push
        } else if (value - REQUEST_BASE) % 2 == 1 {
            MessageCategory::Request
        } else {
            MessageCategory::Response
        }
    }

    pub fn category(self) -> MessageCategory {
        Self::category_of(self.as_u16())
    }

    /// Response type paired with a request type
    pub fn response(self) -> Option<Self> {
        if self.category() != MessageCategory::Request {
            return None;
        }
        Self::from_u16(self.as_u16() + 1)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Ping {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Pong {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
}

/// Subscribe to one bucket. Exactly one of `stage_id`/`item_id` is set.
#[derive(Clone, PartialEq, Message)]
pub struct SubscribeReq {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
    #[prost(string, optional, tag = "2")]
    pub stage_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub item_id: Option<String>,
}

impl SubscribeReq {
    pub fn new(seq: u64, bucket: &BucketKey) -> Self {
        let (stage_id, item_id) = bucket.to_selector();
        Self { seq, stage_id, item_id }
    }

    pub fn bucket(&self) -> Result<BucketKey> {
        BucketKey::from_selector(self.stage_id.clone(), self.item_id.clone())
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct SubscribeResp {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct UnsubscribeReq {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
    #[prost(string, optional, tag = "2")]
    pub stage_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub item_id: Option<String>,
}

impl UnsubscribeReq {
    pub fn new(seq: u64, bucket: &BucketKey) -> Self {
        let (stage_id, item_id) = bucket.to_selector();
        Self { seq, stage_id, item_id }
    }

    pub fn bucket(&self) -> Result<BucketKey> {
        BucketKey::from_selector(self.stage_id.clone(), self.item_id.clone())
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct UnsubscribeResp {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Element {
    #[prost(string, optional, tag = "1")]
    pub stage_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub item_id: Option<String>,
    #[prost(sint64, tag = "3")]
    pub amount: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Segment {
    #[prost(string, optional, tag = "1")]
    pub stage_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub item_id: Option<String>,
    #[prost(message, repeated, tag = "3")]
    pub elements: Vec<Element>,
    /// Per-bucket sequence number, increments by one per published segment
    #[prost(uint64, tag = "4")]
    pub seq: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct MatrixUpdateMessage {
    #[prost(message, repeated, tag = "1")]
    pub segments: Vec<Segment>,
}

impl Segment {
    pub fn from_domain(segment: &MatrixSegment, seq: u64) -> Self {
        let (stage_id, item_id) = segment.bucket.to_selector();
        let elements = segment
            .elements
            .iter()
            .map(|e| {
                let (stage_id, item_id) = e.coordinate.to_selector();
                Element {
                    stage_id,
                    item_id,
                    amount: e.amount,
                }
            })
            .collect();
        Self {
            stage_id,
            item_id,
            elements,
            seq,
        }
    }

    /// Validate selectors and convert, returning the segment's sequence
    pub fn to_domain(&self) -> Result<(MatrixSegment, u64)> {
        let bucket = BucketKey::from_selector(self.stage_id.clone(), self.item_id.clone())?;
        let elements = self
            .elements
            .iter()
            .map(|e| {
                BucketKey::from_selector(e.stage_id.clone(), e.item_id.clone())
                    .map(|coordinate| MatrixElement::new(coordinate, e.amount))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((MatrixSegment::new(bucket, elements), self.seq))
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Ping(Ping),
    Pong(Pong),
    MatrixUpdate(MatrixUpdateMessage),
    SubscribeReq(SubscribeReq),
    SubscribeResp(SubscribeResp),
    UnsubscribeReq(UnsubscribeReq),
    UnsubscribeResp(UnsubscribeResp),
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Ping(_) => MessageType::Ping,
            Self::Pong(_) => MessageType::Pong,
            Self::MatrixUpdate(_) => MessageType::MatrixUpdateMessage,
            Self::SubscribeReq(_) => MessageType::MatrixUpdateSubscribeReq,
            Self::SubscribeResp(_) => MessageType::MatrixUpdateSubscribeResp,
            Self::UnsubscribeReq(_) => MessageType::MatrixUpdateUnsubscribeReq,
            Self::UnsubscribeResp(_) => MessageType::MatrixUpdateUnsubscribeResp,
        }
    }

    /// Header followed by the protobuf body
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            Self::Ping(m) => m.encode_to_vec(),
            Self::Pong(m) => m.encode_to_vec(),
            Self::MatrixUpdate(m) => m.encode_to_vec(),
            Self::SubscribeReq(m) => m.encode_to_vec(),
            Self::SubscribeResp(m) => m.encode_to_vec(),
            Self::UnsubscribeReq(m) => m.encode_to_vec(),
            Self::UnsubscribeResp(m) => m.encode_to_vec(),
        };
        let mut out = Vec::with_capacity(HDR_SIZE + body.len());
        out.extend_from_slice(&self.message_type().as_u16().to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < HDR_SIZE {
            return Err(DroplineError::Protocol("frame too short".into()));
        }
        let raw = u16::from_be_bytes([payload[0], payload[1]]);
        let body = &payload[HDR_SIZE..];

        let frame = match MessageType::from_u16(raw) {
            Some(MessageType::Ping) => Self::Ping(Ping::decode(body)?),
            Some(MessageType::Pong) => Self::Pong(Pong::decode(body)?),
            Some(MessageType::MatrixUpdateMessage) => {
                Self::MatrixUpdate(MatrixUpdateMessage::decode(body)?)
            }
            Some(MessageType::MatrixUpdateSubscribeReq) => {
                Self::SubscribeReq(SubscribeReq::decode(body)?)
            }
            Some(MessageType::MatrixUpdateSubscribeResp) => {
                Self::SubscribeResp(SubscribeResp::decode(body)?)
            }
            Some(MessageType::MatrixUpdateUnsubscribeReq) => {
                Self::UnsubscribeReq(UnsubscribeReq::decode(body)?)
            }
            Some(MessageType::MatrixUpdateUnsubscribeResp) => {
                Self::UnsubscribeResp(UnsubscribeResp::decode(body)?)
            }
            Some(MessageType::Unknown) | None => {
                return Err(DroplineError::Protocol(format!(
                    "unknown message type {} ({:?})",
                    raw,
                    MessageType::category_of(raw)
                )))
            }
        };
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_values() {
        assert_eq!(MessageType::Ping.as_u16(), 1);
        assert_eq!(MessageType::Pong.as_u16(), 2);
        assert_eq!(MessageType::MatrixUpdateMessage.as_u16(), 257);
        assert_eq!(MessageType::MatrixUpdateSubscribeReq.as_u16(), 4097);
        assert_eq!(MessageType::MatrixUpdateSubscribeResp.as_u16(), 4098);
    }

    #[test]
    fn test_routing_by_range() {
        assert_eq!(MessageType::Ping.category(), MessageCategory::Liveness);
        assert_eq!(MessageType::MatrixUpdateMessage.category(), MessageCategory::Push);
        assert_eq!(MessageType::MatrixUpdateSubscribeReq.category(), MessageCategory::Request);
        assert_eq!(MessageType::MatrixUpdateSubscribeResp.category(), MessageCategory::Response);
        // Future types still route
        assert_eq!(MessageType::category_of(300), MessageCategory::Push);
        assert_eq!(MessageType::category_of(4101), MessageCategory::Request);
    }

    #[test]
    fn test_response_pairs() {
        assert_eq!(
            MessageType::MatrixUpdateSubscribeReq.response(),
            Some(MessageType::MatrixUpdateSubscribeResp)
        );
        assert_eq!(
            MessageType::MatrixUpdateUnsubscribeReq.response(),
            Some(MessageType::MatrixUpdateUnsubscribeResp)
        );
        assert_eq!(MessageType::Ping.response(), None);
    }

    #[test]
    fn test_header_layout() {
        let frame = Frame::Ping(Ping { seq: 7 });
        let bytes = frame.encode();
        assert_eq!(&bytes[..2], &[0x00, 0x01]);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);

        let sub = Frame::SubscribeReq(SubscribeReq::new(3, &BucketKey::stage("main_01-07").unwrap()));
        assert_eq!(&sub.encode()[..2], &[0x10, 0x01]);
    }

    #[test]
    fn test_decode_rejects_short_and_unknown() {
        assert!(Frame::decode(&[0x01]).is_err());
        assert!(Frame::decode(&[0x00, 0x00]).is_err());
        assert!(Frame::decode(&[0x0F, 0xFF, 0x08, 0x01]).is_err());
    }

    #[test]
    fn test_subscribe_with_both_selectors_rejected() {
        let req = SubscribeReq {
            seq: 1,
            stage_id: Some("main_01-07".into()),
            item_id: Some("30012".into()),
        };
        let decoded = match Frame::decode(&Frame::SubscribeReq(req).encode()).unwrap() {
            Frame::SubscribeReq(r) => r,
            other => panic!("expected SubscribeReq, got {other:?}"),
        };
        assert!(decoded.bucket().is_err());

        let empty = SubscribeReq { seq: 1, stage_id: None, item_id: None };
        assert!(empty.bucket().is_err());
    }

    #[test]
    fn test_segment_with_bad_element_rejected() {
        let segment = Segment {
            stage_id: Some("main_01-07".into()),
            item_id: None,
            elements: vec![Element { stage_id: None, item_id: None, amount: 1 }],
            seq: 1,
        };
        assert!(segment.to_domain().is_err());
    }

    #[test]
    fn test_matrix_update_carries_negative_deltas() {
        let domain = MatrixSegment::new(
            BucketKey::stage("main_01-07").unwrap(),
            vec![
                MatrixElement::new(BucketKey::item("30012").unwrap(), -2),
                MatrixElement::new(BucketKey::item("30013").unwrap(), 5),
            ],
        );
        let frame = Frame::MatrixUpdate(MatrixUpdateMessage {
            segments: vec![Segment::from_domain(&domain, 9)],
        });
        let Frame::MatrixUpdate(decoded) = Frame::decode(&frame.encode()).unwrap() else {
            panic!("expected MatrixUpdate");
        };
        let (segment, seq) = decoded.segments[0].to_domain().unwrap();
        assert_eq!(seq, 9);
        assert_eq!(segment, domain);
    }
}
