// Tagged-record protocol
//
// Requests are a sequence of tagged fields (2-byte tag, little-endian length
// prefix where applicable, payload). Replies are a byte stream of records,
// each terminated by an `XX` end marker. Parsing is strictly positional: the
// encoder preserves correctness by always writing exact length prefixes, and
// the parser resynchronizes on unknown tags by advancing a single byte.
// That resync-by-convention is a known fragility of the wire format; the
// remote server depends on this exact behavior, so it is preserved
// bit-for-bit here.

use bytes::{BufMut, BytesMut};

// Field tags.
pub mod tags {
    pub const NAME: &[u8; 2] = b"NM";
    pub const TYPE: &[u8; 2] = b"TY";
    pub const VALUE: &[u8; 2] = b"VA";
    pub const FLOAT_VALUE: &[u8; 2] = b"FV";
    pub const CORE: &[u8; 2] = b"CO";
    pub const END_OF_RECORD: &[u8; 2] = b"XX";
}

/// Builder for tagged-field request payloads.
///
/// Every request opens with a little-endian mode word; list-form requests
/// follow it with a field count, bare-form requests with a single raw word.
#[derive(Debug, Clone)]
pub struct TaggedRequest {
    buf: BytesMut,
}

impl TaggedRequest {
    pub fn new(mode: u16) -> Self {
        let mut buf = BytesMut::new();
        buf.put_u16_le(mode);
        Self { buf }
    }

    /// Append a raw little-endian word (field count, or the core selector of
    /// a bare-form request).
    pub fn push_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    /// Append a name field. The payload length is the name length plus a
    /// terminator, rounded up to even — name fields require 16-bit alignment.
    pub fn push_name(&mut self, name: &str) {
        let mut padded_len = name.len() + 1;
        if padded_len & 1 != 0 {
            padded_len += 1;
        }
        self.buf.put_slice(tags::NAME);
        self.buf.put_u16_le(padded_len as u16);
        self.buf.put_slice(name.as_bytes());
        self.buf.put_bytes(0, padded_len - name.len());
    }

    /// Append a core selector field (fixed-width, no length prefix).
    pub fn push_core(&mut self, core: u16) {
        self.buf.put_slice(tags::CORE);
        self.buf.put_u16_le(core);
    }

    /// Append a value field (fixed 8 bytes, no length prefix).
    pub fn push_value(&mut self, value: &[u8; 8]) {
        self.buf.put_slice(tags::VALUE);
        self.buf.put_slice(value);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// One decoded reply record. Fields may arrive in any order within a record;
/// absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub name: Option<String>,
    pub ty: Option<String>,
    pub value: Option<[u8; 8]>,
    pub fvalue: Option<f64>,
    pub core: Option<i16>,
}

/// Parse a reply buffer into its records.
///
/// Single pass, lazy. A record left unterminated at the end of the buffer is
/// silently discarded; callers are expected to retry the whole round trip
/// once on empty output (transient-empty-reply quirk of the remote side).
pub fn parse_records(buf: &[u8]) -> Records<'_> {
    Records { buf, pos: 0 }
}

pub struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Records<'_> {
    fn take(&mut self, from: usize, len: usize) -> Option<&[u8]> {
        let start = self.pos + from;
        let field = self.buf.get(start..start + len)?;
        Some(field)
    }
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let mut record = Record::default();
        while self.pos + 2 <= self.buf.len() {
            let tag: &[u8; 2] = self.buf[self.pos..self.pos + 2].try_into().ok()?;
            match tag {
                t if t == tags::NAME => {
                    let len_field = self.take(2, 2)?;
                    let len = u16::from_le_bytes([len_field[0], len_field[1]]) as usize;
                    let raw = self.take(4, len)?.to_vec();
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    record.name = Some(String::from_utf8_lossy(&raw[..end]).into_owned());
                    self.pos += 4 + len;
                }
                t if t == tags::TYPE => {
                    let raw = self.take(2, 3)?;
                    record.ty = Some(String::from_utf8_lossy(raw).into_owned());
                    self.pos += 6;
                }
                t if t == tags::VALUE => {
                    let raw = self.take(2, 8)?;
                    record.value = Some(raw.try_into().unwrap());
                    self.pos += 10;
                }
                // float values are only meaningful for floating-point units;
                // for any other unit the tag bytes fall through to resync
                t if t == tags::FLOAT_VALUE && record.ty.as_deref() == Some("FPU") => {
                    let raw: [u8; 8] = self.take(2, 8)?.try_into().unwrap();
                    record.fvalue = Some(f64::from_be_bytes(raw));
                    self.pos += 10;
                }
                t if t == tags::END_OF_RECORD => {
                    self.pos += 4;
                    return Some(record);
                }
                t if t == tags::CORE => {
                    let raw = self.take(2, 2)?;
                    record.core = Some(i16::from_be_bytes([raw[0], raw[1]]));
                    self.pos += 4;
                }
                _ => self.pos += 1,
            }
        }
        // buffer ended mid-record: drop the partial accumulation
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_bytes(name: &str, ty: &str, value: [u8; 8], core: Option<i16>) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut padded = name.len() + 1;
        if padded & 1 != 0 {
            padded += 1;
        }
        buf.extend_from_slice(tags::NAME);
        buf.extend_from_slice(&(padded as u16).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend(std::iter::repeat(0u8).take(padded - name.len()));
        buf.extend_from_slice(tags::TYPE);
        buf.extend_from_slice(ty.as_bytes());
        buf.push(0);
        buf.extend_from_slice(tags::VALUE);
        buf.extend_from_slice(&value);
        if let Some(core) = core {
            buf.extend_from_slice(tags::CORE);
            buf.extend_from_slice(&core.to_be_bytes());
        }
        buf.extend_from_slice(tags::END_OF_RECORD);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    #[test]
    fn test_request_wire_format() {
        // read request for register "R0", no core
        let mut req = TaggedRequest::new(0b10);
        req.push_u16(1);
        req.push_name("R0");
        assert_eq!(
            req.as_bytes(),
            &[0x02, 0x00, 0x01, 0x00, b'N', b'M', 0x04, 0x00, b'R', b'0', 0x00, 0x00]
        );
    }

    #[test]
    fn test_name_padding_keeps_even_alignment() {
        let mut req = TaggedRequest::new(0b10);
        req.push_u16(1);
        req.push_name("PC");
        // "PC" -> 3 -> padded to 4
        assert_eq!(req.as_bytes()[6..8], [0x04, 0x00]);
        let mut req = TaggedRequest::new(0b10);
        req.push_u16(1);
        req.push_name("R10");
        // "R10" -> 4 already even
        assert_eq!(req.as_bytes()[6..8], [0x04, 0x00]);
    }

    #[test]
    fn test_parse_single_record() {
        let buf = record_bytes("R0", "CPU", [0; 8], None);
        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("R0"));
        assert_eq!(records[0].ty.as_deref(), Some("CPU"));
        assert_eq!(records[0].value, Some([0; 8]));
        assert_eq!(records[0].core, None);
        assert_eq!(records[0].fvalue, None);
    }

    #[test]
    fn test_parse_many_records() {
        let mut buf = Vec::new();
        for i in 0..5i16 {
            buf.extend(record_bytes(&format!("R{i}"), "CPU", [i as u8; 8], Some(i)));
        }
        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records.len(), 5);
        for (i, rec) in records.iter().enumerate() {
            assert_eq!(rec.name.as_deref(), Some(format!("R{i}").as_str()));
            assert_eq!(rec.core, Some(i as i16));
        }
    }

    #[test]
    fn test_core_is_big_endian() {
        let mut second = Vec::new();
        second.extend_from_slice(tags::CORE);
        second.extend_from_slice(&[0x01, 0x02]);
        second.extend_from_slice(tags::END_OF_RECORD);
        second.extend_from_slice(&[0, 0]);
        let buf = [record_bytes("R0", "CPU", [0; 8], None), second].concat();
        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records[1].core, Some(0x0102));
    }

    #[test]
    fn test_float_value_requires_fpu_type() {
        let mut buf = Vec::new();
        buf.extend_from_slice(tags::TYPE);
        buf.extend_from_slice(b"FPU");
        buf.push(0);
        buf.extend_from_slice(tags::FLOAT_VALUE);
        buf.extend_from_slice(&2.5f64.to_be_bytes());
        buf.extend_from_slice(tags::END_OF_RECORD);
        buf.extend_from_slice(&[0, 0]);
        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records[0].fvalue, Some(2.5));

        // same stream with a CPU type: FV is not a recognized field
        let mut buf = Vec::new();
        buf.extend_from_slice(tags::TYPE);
        buf.extend_from_slice(b"CPU");
        buf.push(0);
        buf.extend_from_slice(tags::FLOAT_VALUE);
        buf.extend_from_slice(&[0x01; 8]);
        buf.extend_from_slice(tags::END_OF_RECORD);
        buf.extend_from_slice(&[0, 0]);
        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records[0].fvalue, None);
    }

    #[test]
    fn test_truncated_tail_is_discarded() {
        let mut buf = record_bytes("R0", "CPU", [1; 8], None);
        buf.extend(record_bytes("R1", "CPU", [2; 8], None));
        // dangling record with no end marker
        buf.extend_from_slice(tags::NAME);
        buf.extend_from_slice(&[0x04, 0x00]);
        buf.extend_from_slice(b"R2\0\0");
        buf.extend_from_slice(tags::VALUE);
        buf.extend_from_slice(&[3; 4]); // value itself cut short

        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name.as_deref(), Some("R1"));
    }

    #[test]
    fn test_unknown_bytes_resync_by_single_step() {
        let mut buf = vec![0xAA, 0xBB, 0xCC];
        buf.extend(record_bytes("R7", "CPU", [7; 8], None));
        let records: Vec<Record> = parse_records(&buf).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("R7"));
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        assert_eq!(parse_records(&[]).count(), 0);
    }
}
