use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::pcm::decode_interleaved_i16;
use super::StreamError;
use crate::config::Settings;

/// Accepts resynthesized PCM for playback. May block briefly on a full
/// device buffer; mid-run failures are reported, logged by the caller and
/// otherwise ignored.
pub trait PlaybackSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), StreamError>;
}

/// cpal-backed playback. Writes queue onto a bounded channel that the output
/// callback drains; when the callback starves it plays silence and flags an
/// underrun, which surfaces on the next write.
pub struct CpalPlayback {
    tx: Sender<Vec<u8>>,
    underrun: Arc<AtomicBool>,
    hop_frames: usize,
    _stream: cpal::Stream,
}

impl CpalPlayback {
    pub fn open(settings: &Settings) -> Result<Self> {
        let host = cpal::default_host();
        let device = match &settings.playback_device {
            Some(name) => host
                .output_devices()
                .context("Failed to enumerate playback devices")?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| anyhow!("Playback device not found: {}", name))?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("No playback device available"))?,
        };
        log::info!(
            "Playback device: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let config = cpal::StreamConfig {
            channels: settings.layout.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let layout = settings.layout;
        let (tx, rx) = bounded::<Vec<u8>>(8);
        let underrun = Arc::new(AtomicBool::new(false));
        let underrun_flag = Arc::clone(&underrun);

        let mut pending: Vec<i16> = Vec::new();
        let mut started = false;
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut filled = 0;
                    while filled < data.len() {
                        if pending.is_empty() {
                            match rx.try_recv() {
                                Ok(bytes) => {
                                    started = true;
                                    decode_interleaved_i16(layout, &bytes, &mut pending);
                                }
                                Err(_) => break,
                            }
                        }
                        let n = (data.len() - filled).min(pending.len());
                        data[filled..filled + n].copy_from_slice(&pending[..n]);
                        pending.drain(..n);
                        filled += n;
                    }
                    if filled < data.len() {
                        data[filled..].fill(0);
                        // silence until the first write is expected, not an underrun
                        if started {
                            underrun_flag.store(true, Ordering::Relaxed);
                        }
                    }
                },
                |err| log::warn!("playback stream error: {}", err),
                None,
            )
            .context("Failed to build playback stream")?;
        stream.play().context("Failed to start playback stream")?;

        Ok(Self {
            tx,
            underrun,
            hop_frames: settings.audio_period,
            _stream: stream,
        })
    }
}

impl PlaybackSink for CpalPlayback {
    fn write(&mut self, pcm: &[u8]) -> Result<(), StreamError> {
        if self.underrun.swap(false, Ordering::Relaxed) {
            return Err(StreamError::Underrun);
        }
        match self
            .tx
            .send_timeout(pcm.to_vec(), Duration::from_millis(200))
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(StreamError::Short {
                got: 0,
                want: self.hop_frames,
            }),
            Err(SendTimeoutError::Disconnected(_)) => Err(StreamError::Disconnected),
        }
    }
}
