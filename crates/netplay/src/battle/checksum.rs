use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub frame: u32,
    pub checksum: u32,
}

/// Ring of recent per-frame checksums, one slot per checksum interval.
///
/// Slots are reused, so lookups compare the stored frame number and treat a
/// stale slot as missing.
#[derive(Debug, Clone)]
pub struct ChecksumBuffer {
    entries: Vec<Option<ChecksumEntry>>,
    interval: u32,
}

impl ChecksumBuffer {
    /// Sized to cover every frame a checksum can legitimately arrive for:
    /// `ceil((2 * delay + 2) / interval)` slots.
    pub fn new(input_delay: u32, interval: u32) -> Self {
        let interval = interval.max(1);
        let capacity = (2 * input_delay + 2).div_ceil(interval) as usize;
        Self {
            entries: vec![None; capacity],
            interval,
        }
    }

    fn slot(&self, frame: u32) -> usize {
        (frame / self.interval) as usize % self.entries.len()
    }

    /// Stores `checksum` for `frame`. Frames off the interval grid are refused.
    pub fn insert(&mut self, frame: u32, checksum: u32) -> bool {
        if frame % self.interval != 0 {
            return false;
        }
        let index = self.slot(frame);
        self.entries[index] = Some(ChecksumEntry { frame, checksum });
        true
    }

    pub fn get(&self, frame: u32) -> Option<u32> {
        self.entries[self.slot(frame)]
            .filter(|e| e.frame == frame)
            .map(|e| e.checksum)
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.entries {
            *slot = None;
        }
    }
}

/// Why a received checksum was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumDiscard {
    OffInterval,
    TooFarAhead,
    TooFarBehind,
}

impl fmt::Display for ChecksumDiscard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OffInterval => "frame is not on the checksum interval",
            Self::TooFarAhead => "frame too far in the future",
            Self::TooFarBehind => "frame too far in the past",
        })
    }
}

/// Checks whether a remote checksum for `frame` can still be compared.
///
/// The remote side sends its checksum at the start of a frame. With input
/// for frame `current` sent, it can be at most `delay + 1` frames ahead; and
/// while we wait for its next input we may still be `delay` frames ahead of
/// the checksum it sent.
pub fn check_remote_frame(
    frame: u32,
    current: u32,
    delay: u32,
    interval: u32,
) -> Result<(), ChecksumDiscard> {
    let (frame, current, delay) = (u64::from(frame), u64::from(current), u64::from(delay));
    if frame % u64::from(interval.max(1)) != 0 {
        return Err(ChecksumDiscard::OffInterval);
    }
    if frame > current + delay + 1 {
        return Err(ChecksumDiscard::TooFarAhead);
    }
    if frame + delay < current {
        return Err(ChecksumDiscard::TooFarBehind);
    }
    Ok(())
}

/// CRC-32 over simulation values, fed in big-endian so both peers agree
/// regardless of platform.
#[derive(Debug, Clone, Default)]
pub struct StateHasher {
    crc: crc32fast::Hasher,
}

impl StateHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.crc.update(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.crc.update(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.crc.update(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.crc.update(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.crc.update(&value.to_be_bytes());
    }

    pub fn finish(self) -> u32 {
        self.crc.finalize()
    }
}
