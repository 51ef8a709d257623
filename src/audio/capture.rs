use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::pcm::encode_interleaved_i16;
use super::StreamError;
use crate::config::Settings;

/// Blocking source of capture hops: one call returns one hop of interleaved
/// PCM, pacing the control loop to real time.
pub trait CaptureSource {
    fn read_hop(&mut self) -> Result<Vec<u8>, StreamError>;
}

/// cpal-backed capture. The input callback converts device samples into the
/// wire format, chunks them into hop-sized buffers and hands them to the
/// processing loop over a bounded channel; a full channel marks an overrun
/// and drops the hop.
pub struct CpalCapture {
    rx: Receiver<Vec<u8>>,
    overrun: Arc<AtomicBool>,
    hop_frames: usize,
    _stream: cpal::Stream,
}

impl CpalCapture {
    pub fn open(settings: &Settings) -> Result<Self> {
        let host = cpal::default_host();
        let device = match &settings.capture_device {
            Some(name) => host
                .input_devices()
                .context("Failed to enumerate capture devices")?
                .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
                .ok_or_else(|| anyhow!("Capture device not found: {}", name))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("No capture device available"))?,
        };
        log::info!(
            "Capture device: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let config = cpal::StreamConfig {
            channels: settings.layout.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let layout = settings.layout;
        let hop_bytes = settings.audio_period * layout.frame_bytes();
        // a few hops of slack between the callback and the loop
        let (tx, rx) = bounded::<Vec<u8>>(4);
        let overrun = Arc::new(AtomicBool::new(false));
        let overrun_flag = Arc::clone(&overrun);

        let mut pending: Vec<u8> = Vec::with_capacity(hop_bytes * 2);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    encode_interleaved_i16(layout, data, &mut pending);
                    while pending.len() >= hop_bytes {
                        let hop: Vec<u8> = pending.drain(..hop_bytes).collect();
                        if tx.try_send(hop).is_err() {
                            overrun_flag.store(true, Ordering::Relaxed);
                        }
                    }
                },
                |err| log::warn!("capture stream error: {}", err),
                None,
            )
            .context("Failed to build capture stream")?;
        stream.play().context("Failed to start capture stream")?;

        Ok(Self {
            rx,
            overrun,
            hop_frames: settings.audio_period,
            _stream: stream,
        })
    }
}

impl CaptureSource for CpalCapture {
    fn read_hop(&mut self) -> Result<Vec<u8>, StreamError> {
        if self.overrun.swap(false, Ordering::Relaxed) {
            return Err(StreamError::Overrun);
        }
        match self.rx.recv_timeout(Duration::from_secs(5)) {
            Ok(hop) => Ok(hop),
            Err(RecvTimeoutError::Timeout) => Err(StreamError::Short {
                got: 0,
                want: self.hop_frames,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(StreamError::Disconnected),
        }
    }
}
