//! CPAL capture engine binding
//!
//! Implements [`CaptureEngine`] on top of a `cpal` input stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  enqueue()  ┌─────────────────────┐
//! │  Client thread   │────────────►│   Pending buffers   │
//! │ (queue manager)  │             │     (VecDeque)      │
//! └────────┬─────────┘             └──────────┬──────────┘
//!          │ start/pause/stop                 │ fill front buffer
//!          ▼                                  ▼
//! ┌──────────────────┐  play/pause ┌─────────────────────┐
//! │  Worker thread   │◄───────────►│  CPAL input stream  │
//! │ (owns the Stream)│             │  (callback thread)  │
//! └──────────────────┘             └──────────┬──────────┘
//!                                             │ buffer full
//!                                             ▼
//!                                    completion handler
//! ```
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated worker
//! thread and play/pause commands reach it over a crossbeam channel. The
//! data callback fills pending buffers front-to-back and fires the
//! completion handler whenever one fills; captured data arriving while no
//! buffer is pending is counted and dropped.
//!
//! This binding captures native-endian signed 16-bit or 32-bit float PCM;
//! other descriptors are rejected with `UnsupportedFormat`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{JoinHandle, ThreadId};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use crossbeam::channel::{bounded, unbounded, Sender};

use crate::buffer::CaptureBuffer;
use crate::config::{DeviceId, QueueConfig};
use crate::format::AudioFormat;

use super::device::{find_input_device, get_default_input_device};
use super::error::{EngineError, EngineResult};
use super::{
    parameters, properties, CaptureEngine, CaptureEngineFactory, Completion, CompletionHandler,
    EnqueueError, ParameterId, PropertyId,
};

/// Factory for the default cpal-backed capture engine
pub struct CpalEngineFactory;

impl CaptureEngineFactory for CpalEngineFactory {
    fn create(
        &self,
        format: &AudioFormat,
        config: &QueueConfig,
        handler: CompletionHandler,
    ) -> EngineResult<Arc<dyn CaptureEngine>> {
        let engine = CpalCaptureEngine::create(format, config, handler)?;
        Ok(engine)
    }
}

/// Commands sent to the worker thread that owns the cpal stream
enum StreamCmd {
    Play(Sender<EngineResult<()>>),
    Pause(Sender<EngineResult<()>>),
    Shutdown,
}

/// Tracks whether a completion delivery is in flight, and on which thread,
/// so `stop()` can wait for quiescence without deadlocking when a delegate
/// calls back into the queue from inside a delivery.
#[derive(Default)]
struct DeliveryGate {
    in_flight: usize,
    thread: Option<ThreadId>,
}

/// State shared between the client-facing engine handle, the worker thread
/// and the cpal callback thread
struct CaptureShared {
    format: AudioFormat,
    /// Buffers handed over by `enqueue`, filled front-to-back
    pending: Mutex<VecDeque<CaptureBuffer>>,
    /// Installed completion handler; locked only while invoking it
    handler: Mutex<CompletionHandler>,
    gate: Mutex<DeliveryGate>,
    gate_cv: Condvar,
    /// Linear input gain as f32 bits (atomic so the callback reads lock-free)
    gain_bits: AtomicU32,
    running: AtomicBool,
    stopped: AtomicBool,
    /// Capture bytes discarded because no buffer was pending
    dropped_bytes: AtomicU64,
    /// Capacity of the most recently enqueued buffer (property table)
    buffer_size: AtomicU64,
}

impl CaptureShared {
    /// Invoke the completion handler with quiescence bookkeeping.
    /// Never called with `pending` locked.
    fn deliver(&self, completion: Completion) {
        {
            let mut gate = self.gate.lock().unwrap();
            gate.in_flight += 1;
            gate.thread = Some(std::thread::current().id());
        }
        {
            let mut handler = self.handler.lock().unwrap();
            if !self.stopped.load(Ordering::Acquire) {
                handler(completion);
            }
        }
        {
            let mut gate = self.gate.lock().unwrap();
            gate.in_flight -= 1;
            if gate.in_flight == 0 {
                gate.thread = None;
            }
        }
        self.gate_cv.notify_all();
    }

    /// Block until no delivery is in flight. Skipped when called from the
    /// delivery itself (a delegate stopping the queue from its callback).
    fn await_quiescence(&self) {
        let mut gate = self.gate.lock().unwrap();
        if gate.thread == Some(std::thread::current().id()) {
            return;
        }
        while gate.in_flight > 0 {
            gate = self.gate_cv.wait(gate).unwrap();
        }
    }
}

/// Sample types the binding can capture, with gain applied per-sample
trait GainSample: bytemuck::Pod {
    fn scaled(self, gain: f32) -> Self;
}

impl GainSample for f32 {
    fn scaled(self, gain: f32) -> Self {
        self * gain
    }
}

impl GainSample for i16 {
    fn scaled(self, gain: f32) -> Self {
        (self as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }
}

/// cpal data callback body: route captured samples into pending buffers
fn deliver_samples<T: GainSample>(shared: &Arc<CaptureShared>, samples: &[T], scratch: &mut Vec<T>) {
    if shared.stopped.load(Ordering::Acquire) || !shared.running.load(Ordering::Acquire) {
        return;
    }

    let gain = f32::from_bits(shared.gain_bits.load(Ordering::Relaxed));
    if (gain - 1.0).abs() > f32::EPSILON {
        scratch.clear();
        scratch.extend(samples.iter().map(|s| s.scaled(gain)));
        push_bytes(shared, bytemuck::cast_slice(scratch.as_slice()));
    } else {
        push_bytes(shared, bytemuck::cast_slice(samples));
    }
}

fn push_bytes(shared: &Arc<CaptureShared>, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        if shared.stopped.load(Ordering::Acquire) {
            return;
        }

        // Fill the front buffer; pop it out of the queue once full so the
        // handler can take ownership without the pending lock held.
        let completed = {
            let mut pending = shared.pending.lock().unwrap();
            match pending.front_mut() {
                Some(front) => {
                    let n = front.fill_from(bytes);
                    bytes = &bytes[n..];
                    if front.is_full() {
                        pending.pop_front()
                    } else {
                        None
                    }
                }
                None => {
                    shared
                        .dropped_bytes
                        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    return;
                }
            }
        };

        if let Some(mut buffer) = completed {
            let packets = shared.format.packets_for_bytes(buffer.filled().len());
            buffer.set_packets(packets);
            shared.deliver(Completion::Data { buffer, packets });
        }
    }
}

/// Resolve the device and build the input stream. Runs on the worker thread
/// because the resulting `Stream` must stay there.
fn build_capture_stream(
    format: &AudioFormat,
    device_id: Option<&DeviceId>,
    shared: &Arc<CaptureShared>,
) -> EngineResult<(cpal::Stream, String)> {
    let device = match device_id {
        Some(id) => find_input_device(id)?,
        None => get_default_input_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using capture device: {}", device_name);

    let stream_config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    log::debug!(
        "Capture config: {} channels, {}Hz, {}-bit {}",
        format.channels,
        format.sample_rate,
        format.bits_per_sample,
        if format.is_float { "float" } else { "int" }
    );

    let err_shared = shared.clone();
    let err_fn = move |err: cpal::StreamError| {
        log::error!("Capture stream error: {}", err);
        if !err_shared.stopped.load(Ordering::Acquire) {
            err_shared.deliver(Completion::Error(EngineError::StreamError(err.to_string())));
        }
    };

    let stream = match (format.is_float, format.bits_per_sample) {
        (true, 32) => {
            let data_shared = shared.clone();
            let mut scratch: Vec<f32> = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    deliver_samples(&data_shared, data, &mut scratch);
                },
                err_fn,
                None, // No timeout (blocking)
            )
        }
        (false, 16) => {
            let data_shared = shared.clone();
            let mut scratch: Vec<i16> = Vec::new();
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _info: &cpal::InputCallbackInfo| {
                    deliver_samples(&data_shared, data, &mut scratch);
                },
                err_fn,
                None,
            )
        }
        _ => {
            return Err(EngineError::UnsupportedFormat(format!(
                "{}-bit {} PCM (this binding captures i16 or f32)",
                format.bits_per_sample,
                if format.is_float { "float" } else { "int" }
            )))
        }
    }
    .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

    Ok((stream, device_name))
}

/// Capture engine backed by a cpal input stream
pub struct CpalCaptureEngine {
    shared: Arc<CaptureShared>,
    cmd_tx: Sender<StreamCmd>,
    worker: Mutex<Option<JoinHandle<()>>>,
    device_name: String,
}

impl CpalCaptureEngine {
    pub fn create(
        format: &AudioFormat,
        config: &QueueConfig,
        handler: CompletionHandler,
    ) -> EngineResult<Arc<Self>> {
        if format.is_big_endian != cfg!(target_endian = "big") {
            return Err(EngineError::UnsupportedFormat(
                "non-native byte order".to_string(),
            ));
        }

        let shared = Arc::new(CaptureShared {
            format: *format,
            pending: Mutex::new(VecDeque::new()),
            handler: Mutex::new(handler),
            gate: Mutex::new(DeliveryGate::default()),
            gate_cv: Condvar::new(),
            gain_bits: AtomicU32::new(1.0_f32.to_bits()),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            dropped_bytes: AtomicU64::new(0),
            buffer_size: AtomicU64::new(0),
        });

        let (cmd_tx, cmd_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let thread_shared = shared.clone();
        let thread_format = *format;
        let device_id = config.device.clone();
        let worker = std::thread::Builder::new()
            .name("pcmtap-capture".to_string())
            .spawn(move || {
                let stream =
                    match build_capture_stream(&thread_format, device_id.as_ref(), &thread_shared)
                    {
                        Ok((stream, name)) => {
                            let _ = ready_tx.send(Ok(name));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                for cmd in cmd_rx.iter() {
                    match cmd {
                        StreamCmd::Play(ack) => {
                            let _ = ack.send(
                                stream
                                    .play()
                                    .map_err(|e| EngineError::StreamStartError(e.to_string())),
                            );
                        }
                        StreamCmd::Pause(ack) => {
                            let _ = ack.send(
                                stream
                                    .pause()
                                    .map_err(|e| EngineError::StreamPauseError(e.to_string())),
                            );
                        }
                        StreamCmd::Shutdown => break,
                    }
                }
                // Stream drops here, on the thread that built it
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        let device_name = ready_rx
            .recv()
            .map_err(|_| EngineError::StreamBuildError("capture worker exited during setup".to_string()))??;

        Ok(Arc::new(Self {
            shared,
            cmd_tx,
            worker: Mutex::new(Some(worker)),
            device_name,
        }))
    }

    fn roundtrip(&self, make: impl FnOnce(Sender<EngineResult<()>>) -> StreamCmd) -> EngineResult<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.cmd_tx
            .send(make(ack_tx))
            .map_err(|_| EngineError::StreamError("capture worker is gone".to_string()))?;
        ack_rx
            .recv()
            .map_err(|_| EngineError::StreamError("capture worker is gone".to_string()))?
    }
}

impl CaptureEngine for CpalCaptureEngine {
    fn start(&self) -> EngineResult<()> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        self.roundtrip(StreamCmd::Play)?;
        self.shared.running.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&self) -> EngineResult<()> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        self.shared.running.store(false, Ordering::Release);
        self.roundtrip(StreamCmd::Pause)
    }

    fn stop(&self) -> EngineResult<()> {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return Ok(()); // already stopped
        }
        self.shared.running.store(false, Ordering::Release);
        let result = self.roundtrip(StreamCmd::Pause);
        self.shared.await_quiescence();

        let dropped = self.shared.dropped_bytes.load(Ordering::Relaxed);
        if dropped > 0 {
            log::warn!(
                "Capture engine dropped {} bytes while no buffer was pending",
                dropped
            );
        }
        result
    }

    fn enqueue(&self, mut buffer: CaptureBuffer) -> Result<(), EnqueueError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(EnqueueError {
                buffer,
                reason: EngineError::Stopped,
            });
        }
        buffer.clear();
        self.shared
            .buffer_size
            .store(buffer.capacity() as u64, Ordering::Relaxed);
        self.shared.pending.lock().unwrap().push_back(buffer);
        Ok(())
    }

    fn reclaim(&self) -> Vec<CaptureBuffer> {
        self.shared.pending.lock().unwrap().drain(..).collect()
    }

    fn set_property(&self, id: PropertyId, _data: &[u8]) -> EngineResult<()> {
        match id {
            properties::DEVICE_NAME | properties::BUFFER_SIZE_BYTES | properties::IS_RUNNING => {
                Err(EngineError::PropertyReadOnly(id.0))
            }
            _ => Err(EngineError::UnknownProperty(id.0)),
        }
    }

    fn get_property(&self, id: PropertyId) -> EngineResult<Vec<u8>> {
        match id {
            properties::DEVICE_NAME => Ok(self.device_name.as_bytes().to_vec()),
            properties::BUFFER_SIZE_BYTES => {
                let size = self.shared.buffer_size.load(Ordering::Relaxed) as u32;
                Ok(size.to_le_bytes().to_vec())
            }
            properties::IS_RUNNING => {
                Ok(vec![self.shared.running.load(Ordering::Acquire) as u8])
            }
            _ => Err(EngineError::UnknownProperty(id.0)),
        }
    }

    fn set_parameter(&self, id: ParameterId, value: f32) -> EngineResult<()> {
        match id {
            parameters::INPUT_GAIN => {
                if !value.is_finite() || value < 0.0 {
                    return Err(EngineError::InvalidParameterValue { id: id.0, value });
                }
                self.shared.gain_bits.store(value.to_bits(), Ordering::Relaxed);
                Ok(())
            }
            _ => Err(EngineError::UnknownParameter(id.0)),
        }
    }

    fn get_parameter(&self, id: ParameterId) -> EngineResult<f32> {
        match id {
            parameters::INPUT_GAIN => {
                Ok(f32::from_bits(self.shared.gain_bits.load(Ordering::Relaxed)))
            }
            _ => Err(EngineError::UnknownParameter(id.0)),
        }
    }
}

impl Drop for CpalCaptureEngine {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        let _ = self.cmd_tx.send(StreamCmd::Shutdown);
        if let Some(worker) = self.worker.lock().unwrap().take() {
            let _ = worker.join();
        }
    }
}
