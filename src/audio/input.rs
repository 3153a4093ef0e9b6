// src/audio/input.rs  —  microphone capture into a bounded, lock-free-for-the-
// producer sample ring.
//
// The cpal input callback runs on a real-time thread and must never block.
// It reaches for the ring with `try_lock`: if the consumer (the runtime
// worker) currently holds the lock, the whole incoming block is dropped
// rather than stalling the callback waiting for it. When the lock is free,
// overflow is handled by dropping the *oldest* buffered samples first, so a
// momentarily slow consumer loses history, not the most recent audio.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Ring {
    buf: VecDeque<f32>,
    capacity: usize,
}

impl Ring {
    fn push_dropping_oldest(&mut self, samples: impl Iterator<Item = f32>) {
        for s in samples {
            if self.buf.len() >= self.capacity {
                self.buf.pop_front();
            }
            self.buf.push_back(s);
        }
    }
}

/// Shared handle to the capture ring. Clone freely; all clones see the same
/// buffer.
#[derive(Clone)]
pub struct InputRing {
    ring: Arc<Mutex<Ring>>,
    sample_rate: u32,
}

impl InputRing {
    fn new(capacity: usize, sample_rate: u32) -> Self {
        Self { ring: Arc::new(Mutex::new(Ring { buf: VecDeque::with_capacity(capacity), capacity })), sample_rate }
    }

    pub fn sample_rate(&self) -> u32 { self.sample_rate }

    /// Drain everything currently buffered. Safe to call from the runtime
    /// worker thread; this is the only consumer, so a blocking lock here
    /// never competes with anything but a single producer's brief critical
    /// section.
    pub fn drain(&self) -> Vec<f32> {
        let mut r = self.ring.lock().unwrap();
        r.buf.drain(..).collect()
    }
}

/// Live microphone capture via cpal, feeding an `InputRing`.
pub struct CpalAudioInput {
    ring: InputRing,
    _stream: Stream,
}

unsafe impl Send for CpalAudioInput {}

impl CpalAudioInput {
    pub fn new(device_name: Option<&str>, ring_capacity_secs: f32) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device not found: {name}"))?,
            None => host.default_input_device().ok_or_else(|| anyhow!("no default input device"))?,
        };
        let config = device.default_input_config()?;
        let sr = config.sample_rate().0;
        let capacity = ((ring_capacity_secs.max(0.1)) * sr as f32) as usize;
        let ring = InputRing::new(capacity.max(sr as usize / 10), sr);

        let r = ring.clone();
        let stream = match config.sample_format() {
            SampleFormat::F32 => build_input_stream::<f32>(&device, &config.into(), r)?,
            SampleFormat::I16 => build_input_stream::<i16>(&device, &config.into(), r)?,
            SampleFormat::U16 => build_input_stream::<u16>(&device, &config.into(), r)?,
            _ => return Err(anyhow!("unsupported input sample format")),
        };
        stream.play()?;
        Ok(Self { ring, _stream: stream })
    }

    pub fn ring(&self) -> InputRing { self.ring.clone() }
}

fn build_input_stream<S>(device: &cpal::Device, config: &cpal::StreamConfig, ring: InputRing) -> Result<Stream>
where
    S: cpal::Sample + cpal::SizedSample,
    f32: cpal::FromSample<S>,
{
    let ch = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[S], _: &cpal::InputCallbackInfo| {
            // Mono-mixdown at capture time: average across channels so the
            // decoder always sees a single-channel stream regardless of the
            // device's native channel count.
            let mono = data.chunks(ch.max(1)).map(|frame| {
                let sum: f32 = frame.iter().map(|s| f32::from_sample(*s)).sum();
                sum / ch.max(1) as f32
            });
            if let Ok(mut r) = ring.ring.try_lock() {
                r.push_dropping_oldest(mono);
            }
        },
        |e| log::error!("audio input error: {e}"),
        None,
    )?;
    Ok(stream)
}
