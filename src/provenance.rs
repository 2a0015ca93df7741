//! Provenance of the data flowing through a pipeline.
//!
//! These are the in-memory identity objects the host pipeline attaches to
//! runs, time windows and individual units of work. The bridge only moves
//! them between processes; see [`record`](crate::record) for their wire form.

use std::fmt;

/// A point in time, as an opaque 64-bit value supplied by the host pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The raw timestamp value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Compact fingerprint of the processing history that produced some data.
///
/// On the wire the fingerprint occupies a fixed number of bytes: longer
/// values are truncated and shorter ones are padded with NULs, so a value
/// that went through a channel may carry trailing NULs. Use
/// [`eq_ignoring_padding`](Self::eq_ignoring_padding) to compare such values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProcessHistoryId(Vec<u8>);

impl ProcessHistoryId {
    /// Create a fingerprint from its compact form.
    pub fn new(compact: impl Into<Vec<u8>>) -> Self {
        Self(compact.into())
    }

    /// The compact form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Compare two fingerprints, ignoring trailing NUL padding.
    pub fn eq_ignoring_padding(&self, other: &ProcessHistoryId) -> bool {
        trim_nuls(&self.0) == trim_nuls(&other.0)
    }
}

impl fmt::Display for ProcessHistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in trim_nuls(&self.0) {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

pub(crate) fn trim_nuls(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Kind of data taking described by a unit of work.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExperimentType {
    /// Not set.
    #[default]
    Undefined = 0,
    /// Regular physics data.
    Physics = 1,
    /// Cosmic-ray data.
    Cosmics = 2,
    /// Test data.
    Test = 3,
    /// Calibration data.
    Calibration = 4,
}

impl From<u8> for ExperimentType {
    fn from(value: u8) -> Self {
        match value {
            1 => ExperimentType::Physics,
            2 => ExperimentType::Cosmics,
            3 => ExperimentType::Test,
            4 => ExperimentType::Calibration,
            _ => ExperimentType::Undefined,
        }
    }
}

/// Provenance of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProvenance {
    /// Run number.
    pub run: u32,
    /// Start of the run.
    pub begin_time: Timestamp,
    /// End of the run.
    pub end_time: Timestamp,
    /// Processing history fingerprint.
    pub process_history_id: ProcessHistoryId,
}

/// Provenance of a time window within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowProvenance {
    /// Run number.
    pub run: u32,
    /// Window number within the run.
    pub window: u32,
    /// Start of the window.
    pub begin_time: Timestamp,
    /// End of the window.
    pub end_time: Timestamp,
    /// Processing history fingerprint.
    pub process_history_id: ProcessHistoryId,
}

/// Provenance of a single unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitProvenance {
    /// Run number.
    pub run: u32,
    /// Window number within the run.
    pub window: u32,
    /// Unit number within the window.
    pub unit: u64,
    /// Identifier of the process that created the unit.
    pub process_guid: Vec<u8>,
    /// Acquisition time.
    pub time: Timestamp,
    /// Whether the unit comes from real (as opposed to simulated) data.
    pub real_data: bool,
    /// Kind of data taking.
    pub experiment_type: ExperimentType,
    /// Bunch crossing number.
    pub bunch_crossing: i32,
    /// Orbit number.
    pub orbit_number: i32,
    /// Store number.
    pub store_number: i32,
    /// Processing history fingerprint.
    pub process_history_id: ProcessHistoryId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_ignoring_padding() {
        let short = ProcessHistoryId::new(b"abc".to_vec());
        let padded = ProcessHistoryId::new(b"abc\0\0\0".to_vec());
        assert_ne!(short, padded);
        assert!(short.eq_ignoring_padding(&padded));
        assert!(!short.eq_ignoring_padding(&ProcessHistoryId::new(b"abd".to_vec())));
    }

    #[test]
    fn test_display_hex() {
        let id = ProcessHistoryId::new(vec![0xde, 0xad, 0, 0]);
        assert_eq!(id.to_string(), "dead");
    }

    #[test]
    fn test_experiment_type_from_wire() {
        assert_eq!(ExperimentType::from(2), ExperimentType::Cosmics);
        assert_eq!(ExperimentType::from(200), ExperimentType::Undefined);
    }
}
