//! Intensity output boundary. The physical controller lives behind
//! `IntensitySink`; the pipeline only ever produces bounded values.

pub const NUM_CHANNELS: usize = 16;
pub const MAX_INTENSITY: u32 = 4096;

/// Fire-and-forget per-cycle intensity output, one value per channel.
/// Implementations must accept values up to `MAX_INTENSITY`.
pub trait IntensitySink {
    fn set_levels(&mut self, levels: &[u32; NUM_CHANNELS]);
}

/// Logs level changes; stands in when no controller hardware is attached.
#[derive(Default)]
pub struct LogSink {
    last: [u32; NUM_CHANNELS],
}

impl IntensitySink for LogSink {
    fn set_levels(&mut self, levels: &[u32; NUM_CHANNELS]) {
        if *levels != self.last {
            log::debug!("levels {:?}", levels);
            self.last = *levels;
        }
    }
}

/// Discards all output.
#[allow(dead_code)]
pub struct NullSink;

impl IntensitySink for NullSink {
    fn set_levels(&mut self, _levels: &[u32; NUM_CHANNELS]) {}
}
