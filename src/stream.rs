//! The output stream driver: owns the dedicated audio thread.
//!
//! The thread builds the cpal output stream itself (stream ownership never
//! leaves it), then runs the steady-state loop: one render pass per buffer
//! period, pushed into a lock-free ring that the sink callback drains. The
//! ring is the only coupling between render cadence and the device's
//! callback cadence, so the 128-frame pipeline never has to match the
//! device's buffer sizes.
//!
//! Device loss is recovered on the thread: the stream is rebuilt on the next
//! buffer period, and after [`MAX_REOPEN_ATTEMPTS`] consecutive failures the
//! driver degrades to silent output instead of blocking anyone.

use crate::config::{EngineDesc, BUFFER_FRAMES};
use crate::device::NegotiatedOutput;
use crate::engine::{EngineShared, RenderSnapshot};
use crate::error::{Result, SoundfieldError};
use crate::events::EngineEvent;
use crate::mixer::{RenderPass, OUTPUT_SAMPLES};
use crate::renderer::SpatialRenderer;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Ring capacity in buffer periods.
const RING_PERIODS: usize = 8;

/// Consecutive reopen failures tolerated before entering the degraded
/// silent-output state.
const MAX_REOPEN_ATTEMPTS: u32 = 3;

pub(crate) struct OutputStreamDriver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OutputStreamDriver {
    /// Spawn the audio thread. Stream build failures on the thread are
    /// reported back here synchronously, so a successful return means the
    /// sink is live.
    pub fn start(
        desc: EngineDesc,
        shared: Arc<EngineShared>,
        renderer: Box<dyn SpatialRenderer>,
        negotiated: NegotiatedOutput,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("soundfield-audio".into())
            .spawn(move || {
                audio_thread_main(desc, shared, renderer, negotiated, thread_running, ready_tx)
            })
            .map_err(|e| SoundfieldError::Engine(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                running,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SoundfieldError::Engine(
                    "audio thread exited during startup".into(),
                ))
            }
        }
    }

    /// Signal the loop to exit and join the thread. Calling stop on an
    /// already-stopped driver is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::Release);
        handle.join().map_err(|_| {
            // A panicking audio thread means a lifecycle contract was broken
            // somewhere upstream.
            SoundfieldError::Engine("audio thread panicked".into())
        })
    }
}

impl Drop for OutputStreamDriver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("output driver teardown failed: {e}");
        }
    }
}

fn audio_thread_main(
    desc: EngineDesc,
    shared: Arc<EngineShared>,
    renderer: Box<dyn SpatialRenderer>,
    negotiated: NegotiatedOutput,
    running: Arc<AtomicBool>,
    ready_tx: Sender<Result<()>>,
) {
    let events = shared.events_tx();
    let device_lost = Arc::new(AtomicBool::new(false));

    let (stream, mut producer) =
        match open_stream(&negotiated, Arc::clone(&device_lost), events.clone()) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
    let _ = ready_tx.send(Ok(()));
    let _ = events.send(EngineEvent::Started);

    let mut pass = RenderPass::new(renderer, events.clone());
    let mut snap = RenderSnapshot::empty();
    let mut out = vec![0.0f32; OUTPUT_SAMPLES];
    let period = Duration::from_secs_f64(BUFFER_FRAMES as f64 / desc.sample_rate as f64);

    // Some(stream) while the sink is alive; None only in the degraded state.
    let mut stream_slot = Some(stream);
    let mut silenced = false;

    while running.load(Ordering::Acquire) {
        if device_lost.swap(false, Ordering::AcqRel) && !silenced {
            drop(stream_slot.take());
            match reopen(&desc, &device_lost, &events, period) {
                Ok((new_stream, new_producer)) => {
                    stream_slot = Some(new_stream);
                    producer = new_producer;
                    let _ = events.send(EngineEvent::DeviceRecovered);
                }
                Err(e) => {
                    log::error!("giving up on output device, producing silence: {e}");
                    silenced = true;
                    let _ = events.send(EngineEvent::OutputSilenced);
                }
            }
        }

        shared.snapshot_into(&mut snap);
        pass.render(&snap, &mut out);

        if silenced || stream_slot.is_none() {
            // Keep wall-clock cadence so source cursors keep advancing and
            // nothing upstream ever blocks on us.
            std::thread::sleep(period);
            continue;
        }

        // Hand the buffer to the sink, pacing on ring backpressure.
        let mut written = 0;
        while written < out.len() {
            written += producer.push_slice(&out[written..]);
            if written == out.len() {
                break;
            }
            if !running.load(Ordering::Acquire) || device_lost.load(Ordering::Acquire) {
                break;
            }
            std::thread::sleep(period / 4);
        }
    }

    drop(stream_slot);
    let _ = events.send(EngineEvent::Stopped);
}

/// Try to bring a lost device back, renegotiating from scratch each attempt.
fn reopen(
    desc: &EngineDesc,
    device_lost: &Arc<AtomicBool>,
    events: &Sender<EngineEvent>,
    period: Duration,
) -> Result<(cpal::Stream, HeapProd<f32>)> {
    let pair = reopen_with(period, || {
        crate::device::negotiate(desc)
            .and_then(|n| open_stream(&n, Arc::clone(device_lost), events.clone()))
    })?;
    device_lost.store(false, Ordering::Release);
    Ok(pair)
}

/// Retry `open` up to [`MAX_REOPEN_ATTEMPTS`] times, sleeping one buffer
/// period between attempts, and surface the last error once the budget is
/// exhausted.
fn reopen_with<T>(period: Duration, mut open: impl FnMut() -> Result<T>) -> Result<T> {
    let mut last_err = SoundfieldError::DeviceUnavailable("no reopen attempt made".into());
    for attempt in 1..=MAX_REOPEN_ATTEMPTS {
        match open() {
            Ok(value) => {
                log::info!("reopened output device on attempt {attempt}");
                return Ok(value);
            }
            Err(e) => {
                log::warn!("device reopen attempt {attempt}/{MAX_REOPEN_ATTEMPTS} failed: {e}");
                last_err = e;
                std::thread::sleep(period);
            }
        }
    }
    Err(last_err)
}

/// Tracks sink starvation across callbacks so a dry spell is reported once,
/// on its first starved callback, rather than every callback until the ring
/// refills.
struct UnderrunLatch {
    latched: bool,
}

impl UnderrunLatch {
    fn new() -> Self {
        Self { latched: false }
    }

    /// Record one callback's pop result. Returns the event to report, if
    /// this callback opens a new dry spell.
    fn observe(&mut self, popped: usize, wanted: usize) -> Option<EngineEvent> {
        if popped < wanted {
            if !self.latched {
                self.latched = true;
                return Some(EngineEvent::SinkUnderrun);
            }
        } else {
            self.latched = false;
        }
        None
    }
}

/// Build and start the cpal output stream. Each stream gets a fresh ring;
/// the consumer half lives inside the callback closure.
fn open_stream(
    negotiated: &NegotiatedOutput,
    device_lost: Arc<AtomicBool>,
    events: Sender<EngineEvent>,
) -> Result<(cpal::Stream, HeapProd<f32>)> {
    let ring = HeapRb::<f32>::new(RING_PERIODS * OUTPUT_SAMPLES);
    let (producer, consumer) = ring.split();

    let stream = match negotiated.sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(negotiated, consumer, device_lost, events)?,
        cpal::SampleFormat::I16 => build_typed::<i16>(negotiated, consumer, device_lost, events)?,
        cpal::SampleFormat::U16 => build_typed::<u16>(negotiated, consumer, device_lost, events)?,
        other => {
            return Err(SoundfieldError::FormatUnsupported(format!(
                "unsupported sample format {other:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| SoundfieldError::SinkWrite(format!("failed to start stream: {e}")))?;

    Ok((stream, producer))
}

fn build_typed<T>(
    negotiated: &NegotiatedOutput,
    mut consumer: HeapCons<f32>,
    device_lost: Arc<AtomicBool>,
    events: Sender<EngineEvent>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let error_events = events.clone();
    let mut staging = vec![0.0f32; OUTPUT_SAMPLES * 4];
    let mut underrun = UnderrunLatch::new();

    let stream = negotiated
        .device
        .build_output_stream(
            &negotiated.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if staging.len() < data.len() {
                    staging.resize(data.len(), 0.0);
                }
                let staging = &mut staging[..data.len()];
                let popped = consumer.pop_slice(staging);
                staging[popped..].fill(0.0);
                if let Some(event) = underrun.observe(popped, staging.len()) {
                    let _ = events.send(event);
                }
                for (dst, src) in data.iter_mut().zip(staging.iter()) {
                    *dst = T::from_sample(*src);
                }
            },
            move |err| {
                log::error!("output stream error: {err}");
                device_lost.store(true, Ordering::Release);
                let _ = error_events.send(EngineEvent::DeviceLost);
            },
            None,
        )
        .map_err(|e| SoundfieldError::SinkWrite(format!("failed to build stream: {e}")))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underrun_reported_once_per_dry_spell() {
        let mut latch = UnderrunLatch::new();
        assert_eq!(latch.observe(10, 64), Some(EngineEvent::SinkUnderrun));
        // The dry spell continues; no repeat reports.
        assert_eq!(latch.observe(0, 64), None);
        assert_eq!(latch.observe(0, 64), None);
        // Ring refilled; the next starvation is a fresh report.
        assert_eq!(latch.observe(64, 64), None);
        assert_eq!(latch.observe(63, 64), Some(EngineEvent::SinkUnderrun));
    }

    #[test]
    fn test_reopen_gives_up_after_attempt_budget() {
        let mut attempts = 0u32;
        let result: Result<()> = reopen_with(Duration::ZERO, || {
            attempts += 1;
            Err(SoundfieldError::DeviceUnavailable(format!(
                "attempt {attempts}"
            )))
        });
        assert_eq!(attempts, MAX_REOPEN_ATTEMPTS);
        match result {
            Err(SoundfieldError::DeviceUnavailable(msg)) => {
                assert_eq!(msg, format!("attempt {MAX_REOPEN_ATTEMPTS}"));
            }
            other => panic!("expected the last attempt's error, got {other:?}"),
        }
    }

    #[test]
    fn test_reopen_stops_retrying_on_success() {
        let mut attempts = 0u32;
        let result = reopen_with(Duration::ZERO, || {
            attempts += 1;
            if attempts < 2 {
                Err(SoundfieldError::DeviceUnavailable("still gone".into()))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts, 2);
    }
}
