//! Typed conversions between interleaved PCM byte buffers and sample values.
//! Components never alias raw bytes as numbers; everything crosses this
//! boundary explicitly.

/// Wire format of the capture/playback byte streams: signed little-endian
/// samples of 1 or 2 bytes, channels interleaved per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub bytes: u8,
    pub channels: u16,
}

impl PcmLayout {
    pub fn frame_bytes(&self) -> usize {
        self.bytes as usize * self.channels as usize
    }

    pub fn sample_min(&self) -> i32 {
        if self.bytes == 1 {
            i8::MIN as i32
        } else {
            i16::MIN as i32
        }
    }

    pub fn sample_max(&self) -> i32 {
        if self.bytes == 1 {
            i8::MAX as i32
        } else {
            i16::MAX as i32
        }
    }

    /// Saturate a wide intermediate into the representable sample range.
    pub fn clamp(&self, value: i64) -> i32 {
        value.clamp(self.sample_min() as i64, self.sample_max() as i64) as i32
    }
}

/// Pull the first channel out of an interleaved buffer as signed samples.
pub fn decode_first_channel(layout: PcmLayout, pcm: &[u8], out: &mut Vec<i32>) {
    out.clear();
    for frame in pcm.chunks_exact(layout.frame_bytes()) {
        let v = match layout.bytes {
            1 => frame[0] as i8 as i32,
            _ => i16::from_le_bytes([frame[0], frame[1]]) as i32,
        };
        out.push(v);
    }
}

/// Encode mono samples into an interleaved buffer: content in channel 0,
/// the remaining channels zeroed.
pub fn encode_mono(layout: PcmLayout, samples: &[i32], out: &mut Vec<u8>) {
    out.clear();
    for &s in samples {
        let v = layout.clamp(s as i64);
        match layout.bytes {
            1 => out.push(v as i8 as u8),
            _ => out.extend_from_slice(&(v as i16).to_le_bytes()),
        }
        for _ in 1..layout.channels {
            for _ in 0..layout.bytes {
                out.push(0);
            }
        }
    }
}

/// Append device samples to a byte buffer in the wire format.
pub fn encode_interleaved_i16(layout: PcmLayout, samples: &[i16], out: &mut Vec<u8>) {
    for &s in samples {
        match layout.bytes {
            1 => out.push((s >> 8) as i8 as u8),
            _ => out.extend_from_slice(&s.to_le_bytes()),
        }
    }
}

/// Decode a wire-format buffer back to device samples, all channels.
pub fn decode_interleaved_i16(layout: PcmLayout, pcm: &[u8], out: &mut Vec<i16>) {
    match layout.bytes {
        1 => out.extend(pcm.iter().map(|&b| ((b as i8) as i16) << 8)),
        _ => out.extend(
            pcm.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        ),
    }
}
