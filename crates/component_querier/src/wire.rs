//! Discovery message framing.
//!
//! All integers are little-endian. A query datagram is a single framed
//! message:
//!
//! ```text
//! +-----------+-------------+--------------------------------------------+
//! | tag: u16  | body_len:u16| type:i32 id:u64 uid:i32 port:u16 fp:i32    |
//! +-----------+-------------+--------------------------------------------+
//! ```
//!
//! A response datagram carries zero or more records packed back to back
//! with no outer count. Each record is `body_len: u16` followed by a body
//! whose first 12 bytes are `type: i32, id: u64`; anything after that is
//! opaque and skipped.

use crate::{
    component::{ComponentId, ComponentType},
    error::{QuerierError, QuerierResult},
};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Message tag of a component id query.
pub const QUERY_COMPONENT_ID: u16 = 1;

/// Size of the `tag` + `body_len` message header.
pub const HEADER_LEN: usize = 4;

/// Size of a query body.
pub const QUERY_BODY_LEN: usize = 22;

/// Smallest record body the decoder accepts.
pub const RECORD_MIN_BODY_LEN: usize = 12;

/// Discovery request broadcast by the querier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    pub component_type: ComponentType,
    /// Always unset on an outbound query.
    pub requester_component_id: ComponentId,
    pub uid: i32,
    pub reply_port: u16,
    pub host_fingerprint: i32,
}

impl QueryRequest {
    pub fn new(component_type: ComponentType, uid: i32, reply_port: u16, host_fingerprint: i32) -> Self {
        Self {
            component_type,
            requester_component_id: ComponentId::UNSET,
            uid,
            reply_port,
            host_fingerprint,
        }
    }

    /// Starts a new message in `framer` and appends every request field.
    pub fn add_to(&self, framer: &mut MessageFramer) -> QuerierResult<()> {
        framer.new_message(QUERY_COMPONENT_ID)?;
        framer.append_i32(self.component_type.0)?;
        framer.append_u64(self.requester_component_id.0)?;
        framer.append_i32(self.uid)?;
        framer.append_u16(self.reply_port)?;
        framer.append_i32(self.host_fingerprint)?;
        Ok(())
    }

    /// Parses a query datagram, as a responder sees it.
    pub fn decode(datagram: &[u8]) -> QuerierResult<Self> {
        if datagram.len() < HEADER_LEN + QUERY_BODY_LEN {
            return Err(QuerierError::malformed(&format!(
                "query datagram of {} bytes is too short",
                datagram.len()
            )));
        }

        let mut cursor = Cursor::new(datagram);
        let tag = cursor.read_u16::<LittleEndian>()?;
        if tag != QUERY_COMPONENT_ID {
            return Err(QuerierError::malformed(&format!("unexpected message tag {}", tag)));
        }
        let body_len = cursor.read_u16::<LittleEndian>()? as usize;
        if body_len != datagram.len() - HEADER_LEN {
            return Err(QuerierError::malformed(&format!(
                "body length {} does not match datagram of {} bytes",
                body_len,
                datagram.len()
            )));
        }

        Ok(Self {
            component_type: ComponentType(cursor.read_i32::<LittleEndian>()?),
            requester_component_id: ComponentId(cursor.read_u64::<LittleEndian>()?),
            uid: cursor.read_i32::<LittleEndian>()?,
            reply_port: cursor.read_u16::<LittleEndian>()?,
            host_fingerprint: cursor.read_i32::<LittleEndian>()?,
        })
    }
}

/// One answer decoded out of a response datagram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResponseRecord {
    pub component_type: ComponentType,
    /// Only meaningful when `component_type` is not unknown.
    pub component_id: ComponentId,
}

impl ResponseRecord {
    pub fn new(component_type: ComponentType, component_id: ComponentId) -> Self {
        Self {
            component_type,
            component_id,
        }
    }

    /// Appends this record to a response datagram.
    pub fn write(&self, packet: &mut Vec<u8>) -> QuerierResult<()> {
        self.write_with_trailer(packet, &[])
    }

    /// Appends this record followed by opaque trailing body bytes.
    pub fn write_with_trailer(&self, packet: &mut Vec<u8>, trailer: &[u8]) -> QuerierResult<()> {
        let body_len = RECORD_MIN_BODY_LEN + trailer.len();
        if body_len > u16::max_value() as usize {
            return Err(QuerierError::new_other("record body does not fit a u16 length"));
        }
        packet.write_u16::<LittleEndian>(body_len as u16)?;
        packet.write_i32::<LittleEndian>(self.component_type.0)?;
        packet.write_u64::<LittleEndian>(self.component_id.0)?;
        packet.extend_from_slice(trailer);
        Ok(())
    }
}

/// Reader over the records packed in a single datagram.
pub struct RecordStream<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> RecordStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        (len - self.cursor.position().min(len)) as usize
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Decodes the record at the front of the stream and advances past it.
    ///
    /// Returns the record with the number of bytes it occupied. On error the
    /// position is left where it was.
    pub fn decode_record(&mut self) -> QuerierResult<(ResponseRecord, usize)> {
        let start = self.cursor.position();
        let decoded = self.read_record();
        if decoded.is_err() {
            self.cursor.set_position(start);
        }
        decoded
    }

    fn read_record(&mut self) -> QuerierResult<(ResponseRecord, usize)> {
        if self.remaining() < 2 {
            return Err(QuerierError::malformed(&format!(
                "{} byte(s) left, no room for a length prefix",
                self.remaining()
            )));
        }
        let body_len = self.cursor.read_u16::<LittleEndian>()? as usize;
        if body_len > self.remaining() {
            return Err(QuerierError::malformed(&format!(
                "length prefix {} exceeds the {} remaining byte(s)",
                body_len,
                self.remaining()
            )));
        }
        if body_len < RECORD_MIN_BODY_LEN {
            return Err(QuerierError::malformed(&format!(
                "record body of {} byte(s) is shorter than {}",
                body_len, RECORD_MIN_BODY_LEN
            )));
        }

        let body_start = self.cursor.position();
        let record = ResponseRecord {
            component_type: ComponentType(self.cursor.read_i32::<LittleEndian>()?),
            component_id: ComponentId(self.cursor.read_u64::<LittleEndian>()?),
        };
        // skip opaque trailing fields
        self.cursor.set_position(body_start + body_len as u64);

        Ok((record, 2 + body_len))
    }
}

/// Builds framed messages and cuts them into datagrams.
pub struct MessageFramer {
    max_datagram: usize,
    message: Vec<u8>,
    packets: Vec<Vec<u8>>,
}

impl MessageFramer {
    pub fn new(max_datagram: usize) -> Self {
        Self {
            max_datagram,
            message: Vec::with_capacity(HEADER_LEN + QUERY_BODY_LEN),
            packets: Vec::new(),
        }
    }

    /// Drops the current message and any datagrams framed from it.
    pub fn clear(&mut self) {
        self.message.clear();
        self.packets.clear();
    }

    /// Starts a message with tag `tag`, discarding whatever was there.
    pub fn new_message(&mut self, tag: u16) -> QuerierResult<()> {
        self.clear();
        self.message.write_u16::<LittleEndian>(tag)?;
        // body length, patched by finalize
        self.message.write_u16::<LittleEndian>(0)?;
        Ok(())
    }

    pub fn append_i32(&mut self, v: i32) -> QuerierResult<()> {
        self.message.write_i32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn append_u64(&mut self, v: u64) -> QuerierResult<()> {
        self.message.write_u64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn append_u16(&mut self, v: u16) -> QuerierResult<()> {
        self.message.write_u16::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn append_bytes(&mut self, v: &[u8]) {
        self.message.extend_from_slice(v);
    }

    /// Finalizes the current message into datagrams.
    ///
    /// A `fresh` finalize writes the header and re-cuts the message. Otherwise
    /// the datagrams from the previous finalize are handed back untouched,
    /// unless there are none yet.
    pub fn finalize(&mut self, fresh: bool) -> &[Vec<u8>] {
        if fresh || self.packets.is_empty() {
            self.packets.clear();
            if self.message.len() >= HEADER_LEN {
                let body_len = (self.message.len() - HEADER_LEN).min(u16::max_value() as usize);
                LittleEndian::write_u16(&mut self.message[2..HEADER_LEN], body_len as u16);
                self.packets = self
                    .message
                    .chunks(self.max_datagram.max(1))
                    .map(|c| c.to_vec())
                    .collect();
            }
        }
        &self.packets
    }

    /// Datagrams produced by the last finalize.
    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }
}

/// Returns the only datagram of a finalized message.
///
/// Fails when nothing has been framed yet.
///
/// # Panics
///
/// The discovery exchange has no reassembly, so a message split over more
/// than one datagram is a contract violation.
pub fn single_datagram(packets: &[Vec<u8>]) -> QuerierResult<&[u8]> {
    assert!(
        packets.len() <= 1,
        "discovery message must fit one datagram, framed into {}",
        packets.len()
    );
    packets
        .first()
        .map(Vec::as_slice)
        .ok_or_else(|| QuerierError::new_other("no framed message"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn request() -> QueryRequest {
        QueryRequest::new(ComponentType::CELL_APP_MANAGER, 1000, 40123, -559_038_737)
    }

    #[test]
    fn it_should_frame_a_query() {
        let mut framer = MessageFramer::new(crate::MAX_UDP_PAYLOAD);
        request().add_to(&mut framer).unwrap();
        let raw = single_datagram(framer.finalize(true)).unwrap().to_vec();

        assert_eq!(raw.len(), HEADER_LEN + QUERY_BODY_LEN);
        assert_eq!(&raw[..4], &[1u8, 0, 22, 0]);
        assert_eq!(QueryRequest::decode(&raw).unwrap(), request());
    }

    #[test]
    fn it_should_frame_queries_at_the_field_limits() {
        let types = [
            ComponentType::UNKNOWN,
            ComponentType::INTERFACES,
            ComponentType(-3),
            ComponentType(i32::MAX),
        ];
        let mut framer = MessageFramer::new(crate::MAX_UDP_PAYLOAD);
        for &component_type in types.iter() {
            for &uid in [i32::MIN, -1, 0, i32::MAX].iter() {
                for &port in [0u16, 1, u16::MAX].iter() {
                    for &fingerprint in [i32::MIN, -559_038_737, 0, i32::MAX].iter() {
                        let sent = QueryRequest::new(component_type, uid, port, fingerprint);
                        sent.add_to(&mut framer).unwrap();
                        let raw = single_datagram(framer.finalize(true)).unwrap();
                        assert_eq!(raw.len(), HEADER_LEN + QUERY_BODY_LEN);
                        assert_eq!(QueryRequest::decode(raw).unwrap(), sent);
                    }
                }
            }
        }
    }

    #[test]
    fn it_should_report_an_empty_framer() {
        let mut framer = MessageFramer::new(crate::MAX_UDP_PAYLOAD);
        assert!(framer.finalize(false).is_empty());
        let err = single_datagram(framer.packets()).unwrap_err();
        match err.kind() {
            ErrorKind::Other(msg) => assert_eq!(msg, "no framed message"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn it_should_replay_framed_bytes() {
        let mut framer = MessageFramer::new(crate::MAX_UDP_PAYLOAD);
        request().add_to(&mut framer).unwrap();
        let first = framer.finalize(true).to_vec();
        let again = framer.finalize(false).to_vec();
        assert_eq!(first, again);
    }

    #[test]
    fn it_should_reject_foreign_tags() {
        let mut raw = vec![];
        raw.write_u16::<LittleEndian>(7).unwrap();
        raw.write_u16::<LittleEndian>(22).unwrap();
        raw.extend_from_slice(&[0; 22]);
        assert!(QueryRequest::decode(&raw).unwrap_err().is_malformed());
    }

    #[test]
    #[should_panic(expected = "must fit one datagram")]
    fn it_should_refuse_to_split_a_message() {
        let mut framer = MessageFramer::new(crate::MAX_UDP_PAYLOAD);
        request().add_to(&mut framer).unwrap();
        framer.append_bytes(&vec![0; crate::MAX_UDP_PAYLOAD]);
        assert_eq!(framer.finalize(true).len(), 2);
        let _ = single_datagram(framer.packets());
    }

    #[test]
    fn it_should_skip_opaque_trailers() {
        let mut packet = vec![];
        ResponseRecord::new(ComponentType::BASE_APP, ComponentId(5))
            .write_with_trailer(&mut packet, &[0xee; 10])
            .unwrap();
        ResponseRecord::new(ComponentType::BASE_APP, ComponentId(6))
            .write(&mut packet)
            .unwrap();

        let mut stream = RecordStream::new(&packet);
        let (first, used) = stream.decode_record().unwrap();
        assert_eq!(first.component_id, ComponentId(5));
        assert_eq!(used, 24);
        let (second, used) = stream.decode_record().unwrap();
        assert_eq!(second.component_id, ComponentId(6));
        assert_eq!(used, 14);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn it_should_not_advance_on_malformed_records() {
        let packet = [40u8, 0, 1, 2, 3];
        let mut stream = RecordStream::new(&packet);
        assert!(stream.decode_record().unwrap_err().is_malformed());
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.remaining(), 5);
    }

    #[test]
    fn it_should_reject_short_bodies() {
        let packet = [4u8, 0, 1, 2, 3, 4];
        let mut stream = RecordStream::new(&packet);
        assert!(stream.decode_record().unwrap_err().is_malformed());
    }
}
