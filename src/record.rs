//! Fixed-layout provenance records.
//!
//! Every record is a fixed-size little-endian frame that starts with the
//! message tag it was sent under. Fixed frames let the receiver post a
//! receive of known size without asking for the length first.
//!
//! ```text
//! Run     (40): tag i32 | phid [16] | begin u64 | end u64 | run u32
//! Window  (44): tag i32 | phid [16] | begin u64 | end u64 | run u32 | window u32
//! Unit    (74): tag i32 | phid [16] | guid [16] | time u64 | real_data u8
//!               | experiment u8 | bunch_crossing i32 | orbit i32 | store i32
//!               | run u32 | window u32 | unit u64
//! ```
//!
//! Fingerprints and GUIDs longer than their field are truncated, shorter
//! ones are padded with NULs. Decoding keeps the padding.

use crate::error::{Error, Result};
use crate::provenance::{
    ExperimentType, ProcessHistoryId, RunProvenance, Timestamp, UnitProvenance, WindowProvenance,
};
use crate::tag::{MessageKind, Tag};

/// Width of the process-history fingerprint field.
pub const FINGERPRINT_WIDTH: usize = 16;

/// Width of the process GUID field.
pub const GUID_WIDTH: usize = 16;

/// Copy `src` into a fixed-width field, truncating or zero-padding.
pub fn copy_and_fill<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut field = [0u8; N];
    let len = src.len().min(N);
    field[..len].copy_from_slice(&src[..len]);
    field
}

/// A fixed-size wire record for one kind of provenance.
pub trait Record: Sized {
    /// Message kind the record is sent under.
    const KIND: MessageKind;

    /// Encoded size in bytes.
    const SIZE: usize;

    /// In-memory provenance this record describes.
    type Provenance;

    /// Build a record from provenance. Never fails.
    fn from_provenance(tag: Tag, provenance: &Self::Provenance) -> Self;

    /// Rebuild the provenance described by this record.
    fn to_provenance(&self) -> Self::Provenance;

    /// Encode into the first [`SIZE`](Record::SIZE) bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`SIZE`](Record::SIZE).
    fn write_to(&self, buf: &mut [u8]);

    /// Decode from a received frame.
    fn read_from(buf: &[u8]) -> Result<Self>;

    /// Encode into a freshly allocated frame.
    fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::SIZE];
        self.write_to(&mut buf);
        buf
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new<R: Record>(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < R::SIZE {
            return Err(Error::Protocol(format!(
                "{} record needs {} bytes, got {}",
                R::KIND.as_str(),
                R::SIZE,
                buf.len()
            )));
        }
        Ok(Self { buf, pos: 0 })
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }
}

/// Frame of a zero-payload control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyRecord {
    /// Tag the record was sent under.
    pub tag: Tag,
}

impl Record for EmptyRecord {
    const KIND: MessageKind = MessageKind::Empty;
    const SIZE: usize = 4;
    type Provenance = ();

    fn from_provenance(tag: Tag, _: &()) -> Self {
        Self { tag }
    }

    fn to_provenance(&self) {}

    fn write_to(&self, buf: &mut [u8]) {
        Writer::new(buf).put(&self.tag.get().to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new::<Self>(buf)?;
        Ok(Self {
            tag: Tag::from_raw(r.i32()),
        })
    }
}

/// Wire form of [`RunProvenance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRecord {
    /// Tag the record was sent under.
    pub tag: Tag,
    /// Fingerprint field.
    pub process_history_id: [u8; FINGERPRINT_WIDTH],
    /// Start of the run.
    pub begin_time: u64,
    /// End of the run.
    pub end_time: u64,
    /// Run number.
    pub run: u32,
}

impl Record for RunRecord {
    const KIND: MessageKind = MessageKind::RunRecord;
    const SIZE: usize = 4 + FINGERPRINT_WIDTH + 8 + 8 + 4; // 40 bytes
    type Provenance = RunProvenance;

    fn from_provenance(tag: Tag, p: &RunProvenance) -> Self {
        Self {
            tag,
            process_history_id: copy_and_fill(p.process_history_id.as_bytes()),
            begin_time: p.begin_time.value(),
            end_time: p.end_time.value(),
            run: p.run,
        }
    }

    fn to_provenance(&self) -> RunProvenance {
        RunProvenance {
            run: self.run,
            begin_time: Timestamp(self.begin_time),
            end_time: Timestamp(self.end_time),
            process_history_id: ProcessHistoryId::new(self.process_history_id.to_vec()),
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        Writer::new(buf)
            .put(&self.tag.get().to_le_bytes())
            .put(&self.process_history_id)
            .put(&self.begin_time.to_le_bytes())
            .put(&self.end_time.to_le_bytes())
            .put(&self.run.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new::<Self>(buf)?;
        Ok(Self {
            tag: Tag::from_raw(r.i32()),
            process_history_id: r.array(),
            begin_time: r.u64(),
            end_time: r.u64(),
            run: r.u32(),
        })
    }
}

/// Wire form of [`WindowProvenance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    /// Tag the record was sent under.
    pub tag: Tag,
    /// Fingerprint field.
    pub process_history_id: [u8; FINGERPRINT_WIDTH],
    /// Start of the window.
    pub begin_time: u64,
    /// End of the window.
    pub end_time: u64,
    /// Run number.
    pub run: u32,
    /// Window number.
    pub window: u32,
}

impl Record for WindowRecord {
    const KIND: MessageKind = MessageKind::WindowRecord;
    const SIZE: usize = RunRecord::SIZE + 4; // 44 bytes
    type Provenance = WindowProvenance;

    fn from_provenance(tag: Tag, p: &WindowProvenance) -> Self {
        Self {
            tag,
            process_history_id: copy_and_fill(p.process_history_id.as_bytes()),
            begin_time: p.begin_time.value(),
            end_time: p.end_time.value(),
            run: p.run,
            window: p.window,
        }
    }

    fn to_provenance(&self) -> WindowProvenance {
        WindowProvenance {
            run: self.run,
            window: self.window,
            begin_time: Timestamp(self.begin_time),
            end_time: Timestamp(self.end_time),
            process_history_id: ProcessHistoryId::new(self.process_history_id.to_vec()),
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        Writer::new(buf)
            .put(&self.tag.get().to_le_bytes())
            .put(&self.process_history_id)
            .put(&self.begin_time.to_le_bytes())
            .put(&self.end_time.to_le_bytes())
            .put(&self.run.to_le_bytes())
            .put(&self.window.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new::<Self>(buf)?;
        Ok(Self {
            tag: Tag::from_raw(r.i32()),
            process_history_id: r.array(),
            begin_time: r.u64(),
            end_time: r.u64(),
            run: r.u32(),
            window: r.u32(),
        })
    }
}

/// Wire form of [`UnitProvenance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitRecord {
    /// Tag the record was sent under.
    pub tag: Tag,
    /// Fingerprint field.
    pub process_history_id: [u8; FINGERPRINT_WIDTH],
    /// Process GUID field.
    pub process_guid: [u8; GUID_WIDTH],
    /// Acquisition time.
    pub time: u64,
    /// Real data flag (0 or 1).
    pub real_data: u8,
    /// Raw [`ExperimentType`].
    pub experiment_type: u8,
    /// Bunch crossing number.
    pub bunch_crossing: i32,
    /// Orbit number.
    pub orbit_number: i32,
    /// Store number.
    pub store_number: i32,
    /// Run number.
    pub run: u32,
    /// Window number.
    pub window: u32,
    /// Unit number.
    pub unit: u64,
}

impl Record for UnitRecord {
    const KIND: MessageKind = MessageKind::UnitRecord;
    const SIZE: usize = 4 + FINGERPRINT_WIDTH + GUID_WIDTH + 8 + 1 + 1 + 4 * 3 + 4 + 4 + 8; // 74 bytes
    type Provenance = UnitProvenance;

    fn from_provenance(tag: Tag, p: &UnitProvenance) -> Self {
        Self {
            tag,
            process_history_id: copy_and_fill(p.process_history_id.as_bytes()),
            process_guid: copy_and_fill(&p.process_guid),
            time: p.time.value(),
            real_data: u8::from(p.real_data),
            experiment_type: p.experiment_type as u8,
            bunch_crossing: p.bunch_crossing,
            orbit_number: p.orbit_number,
            store_number: p.store_number,
            run: p.run,
            window: p.window,
            unit: p.unit,
        }
    }

    fn to_provenance(&self) -> UnitProvenance {
        UnitProvenance {
            run: self.run,
            window: self.window,
            unit: self.unit,
            process_guid: self.process_guid.to_vec(),
            time: Timestamp(self.time),
            real_data: self.real_data != 0,
            experiment_type: ExperimentType::from(self.experiment_type),
            bunch_crossing: self.bunch_crossing,
            orbit_number: self.orbit_number,
            store_number: self.store_number,
            process_history_id: ProcessHistoryId::new(self.process_history_id.to_vec()),
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        Writer::new(buf)
            .put(&self.tag.get().to_le_bytes())
            .put(&self.process_history_id)
            .put(&self.process_guid)
            .put(&self.time.to_le_bytes())
            .put(&[self.real_data, self.experiment_type])
            .put(&self.bunch_crossing.to_le_bytes())
            .put(&self.orbit_number.to_le_bytes())
            .put(&self.store_number.to_le_bytes())
            .put(&self.run.to_le_bytes())
            .put(&self.window.to_le_bytes())
            .put(&self.unit.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Result<Self> {
        let mut r = Reader::new::<Self>(buf)?;
        Ok(Self {
            tag: Tag::from_raw(r.i32()),
            process_history_id: r.array(),
            process_guid: r.array(),
            time: r.u64(),
            real_data: r.u8(),
            experiment_type: r.u8(),
            bunch_crossing: r.i32(),
            orbit_number: r.i32(),
            store_number: r.i32(),
            run: r.u32(),
            window: r.u32(),
            unit: r.u64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Instance;

    fn tag(kind: MessageKind) -> Tag {
        Tag::encode(kind, Instance::from_raw(7))
    }

    fn unit_provenance() -> UnitProvenance {
        UnitProvenance {
            run: 355_100,
            window: 42,
            unit: 1_234_567_890,
            process_guid: b"0123456789abcdef".to_vec(),
            time: Timestamp(6_800_000_000_000),
            real_data: true,
            experiment_type: ExperimentType::Physics,
            bunch_crossing: 1024,
            orbit_number: -3,
            store_number: 7788,
            process_history_id: ProcessHistoryId::new(b"fedcba9876543210".to_vec()),
        }
    }

    #[test]
    fn test_sizes() {
        assert_eq!(EmptyRecord::SIZE, 4);
        assert_eq!(RunRecord::SIZE, 40);
        assert_eq!(WindowRecord::SIZE, 44);
        assert_eq!(UnitRecord::SIZE, 74);
    }

    #[test]
    fn test_copy_and_fill() {
        assert_eq!(copy_and_fill::<4>(b"ab"), *b"ab\0\0");
        assert_eq!(copy_and_fill::<4>(b"abcdef"), *b"abcd");
        assert_eq!(copy_and_fill::<4>(b""), [0u8; 4]);
    }

    #[test]
    fn test_unit_record_exact() {
        let original = unit_provenance();
        let record = UnitRecord::from_provenance(tag(MessageKind::UnitRecord), &original);
        let decoded = UnitRecord::read_from(&record.to_vec()).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(decoded.to_provenance(), original);
    }

    #[test]
    fn test_run_record_layout() {
        let run = RunProvenance {
            run: 0x0102_0304,
            begin_time: Timestamp(10),
            end_time: Timestamp(20),
            process_history_id: ProcessHistoryId::new(b"short".to_vec()),
        };
        let bytes = RunRecord::from_provenance(tag(MessageKind::RunRecord), &run).to_vec();

        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], &tag(MessageKind::RunRecord).get().to_le_bytes());
        assert_eq!(&bytes[4..9], b"short");
        assert!(bytes[9..20].iter().all(|byte| *byte == 0));
        assert_eq!(&bytes[20..28], &10u64.to_le_bytes());
        assert_eq!(&bytes[36..40], &0x0102_0304u32.to_le_bytes());
    }

    #[test]
    fn test_short_fingerprint_padded() {
        let window = WindowProvenance {
            run: 1,
            window: 2,
            begin_time: Timestamp(3),
            end_time: Timestamp(4),
            process_history_id: ProcessHistoryId::new(b"abc".to_vec()),
        };
        let record = WindowRecord::from_provenance(tag(MessageKind::WindowRecord), &window);
        let decoded = WindowRecord::read_from(&record.to_vec()).unwrap().to_provenance();

        assert_eq!(decoded.process_history_id.as_bytes().len(), FINGERPRINT_WIDTH);
        assert_ne!(decoded, window);
        assert!(decoded.process_history_id.eq_ignoring_padding(&window.process_history_id));
        assert_eq!((decoded.run, decoded.window), (1, 2));
    }

    #[test]
    fn test_long_fingerprint_truncated() {
        let mut unit = unit_provenance();
        unit.process_history_id = ProcessHistoryId::new(b"0123456789abcdefEXTRA".to_vec());
        let record = UnitRecord::from_provenance(tag(MessageKind::UnitRecord), &unit);
        let decoded = UnitRecord::read_from(&record.to_vec()).unwrap().to_provenance();

        assert_eq!(decoded.process_history_id.as_bytes(), b"0123456789abcdef");
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = RunRecord::read_from(&[0u8; 39]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
