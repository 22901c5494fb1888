//! Scripted capture engine for queue tests
//!
//! Behaves like a hardware binding but is driven entirely by the test:
//! `complete` pops the front pending buffer, fills it and fires the
//! completion handler on the calling thread, so tests control exactly when
//! and where completions happen. Start/enqueue failures can be scripted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::buffer::CaptureBuffer;
use crate::config::QueueConfig;
use crate::format::AudioFormat;

use super::{
    parameters, properties, CaptureEngine, CaptureEngineFactory, Completion, CompletionHandler,
    EngineError, EngineResult, EnqueueError, ParameterId, PropertyId,
};

/// A writable scratch property in the mock's table (4 bytes)
pub(crate) const MOCK_SCRATCH: PropertyId = PropertyId(0x0100);

pub(crate) struct MockEngine {
    pending: Mutex<VecDeque<CaptureBuffer>>,
    /// Locked only while invoking; doubles as the stop quiescence barrier
    handler: Mutex<CompletionHandler>,
    started: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
    fail_start: AtomicBool,
    fail_enqueue: AtomicBool,
    /// One-shot: the next enqueue is rejected as if stop won a race
    enqueue_stopped_once: AtomicBool,
    total_enqueues: AtomicUsize,
    alignment: usize,
    props: Mutex<HashMap<u32, Vec<u8>>>,
    params: Mutex<HashMap<u32, f32>>,
}

impl MockEngine {
    fn new(handler: CompletionHandler, alignment: usize) -> Self {
        let mut props = HashMap::new();
        props.insert(MOCK_SCRATCH.0, vec![0; 4]);
        let mut params = HashMap::new();
        params.insert(parameters::INPUT_GAIN.0, 1.0);
        Self {
            pending: Mutex::new(VecDeque::new()),
            handler: Mutex::new(handler),
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_enqueue: AtomicBool::new(false),
            enqueue_stopped_once: AtomicBool::new(false),
            total_enqueues: AtomicUsize::new(0),
            alignment,
            props: Mutex::new(props),
            params: Mutex::new(params),
        }
    }

    pub fn script_start_failure(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn script_enqueue_failure(&self) {
        self.fail_enqueue.store(true, Ordering::SeqCst);
    }

    pub fn allow_enqueue(&self) {
        self.fail_enqueue.store(false, Ordering::SeqCst);
    }

    /// Reject the next enqueue with `Stopped`, as if a concurrent stop had
    /// flipped the engine between a state snapshot and the re-enqueue.
    pub fn script_enqueue_stopped(&self) {
        self.enqueue_stopped_once.store(true, Ordering::SeqCst);
    }

    /// Simulate the hardware filling the front pending buffer and firing
    /// the completion callback. Returns false once the engine is stopped
    /// or has no pending buffer.
    pub fn complete(&self, payload: &[u8], packets: u32) -> bool {
        if self.stopped.load(Ordering::Acquire) || !self.started.load(Ordering::Acquire) {
            return false;
        }
        let buffer = self.pending.lock().unwrap().pop_front();
        let Some(mut buffer) = buffer else {
            return false;
        };
        buffer.fill_from(payload);
        buffer.set_packets(packets);

        let mut handler = self.handler.lock().unwrap();
        if self.stopped.load(Ordering::Acquire) {
            // Stop won the race; the engine reclaims the buffer by dropping it
            return false;
        }
        handler(Completion::Data { buffer, packets });
        true
    }

    /// Simulate an asynchronous engine fault
    pub fn fire_error(&self, err: EngineError) {
        let mut handler = self.handler.lock().unwrap();
        if !self.stopped.load(Ordering::Acquire) {
            handler(Completion::Error(err));
        }
    }

    /// Buffers currently owned by the engine
    pub fn enqueued(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Total successful enqueue calls over the engine's lifetime
    pub fn total_enqueues(&self) -> usize {
        self.total_enqueues.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl CaptureEngine for MockEngine {
    fn start(&self) -> EngineResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::StreamStartError("scripted failure".to_string()));
        }
        self.started.store(true, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        Ok(())
    }

    fn pause(&self) -> EngineResult<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Stopped);
        }
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.started.store(false, Ordering::Release);
        // Quiescence barrier: wait out any delivery currently in flight
        drop(self.handler.lock().unwrap());
        Ok(())
    }

    fn enqueue(&self, mut buffer: CaptureBuffer) -> Result<(), EnqueueError> {
        if self.stopped.load(Ordering::Acquire)
            || self.enqueue_stopped_once.swap(false, Ordering::SeqCst)
        {
            return Err(EnqueueError {
                buffer,
                reason: EngineError::Stopped,
            });
        }
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(EnqueueError {
                buffer,
                reason: EngineError::EnqueueRejected("scripted failure".to_string()),
            });
        }
        buffer.clear();
        self.pending.lock().unwrap().push_back(buffer);
        self.total_enqueues.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reclaim(&self) -> Vec<CaptureBuffer> {
        self.pending.lock().unwrap().drain(..).collect()
    }

    fn buffer_alignment(&self) -> usize {
        self.alignment
    }

    fn set_property(&self, id: PropertyId, data: &[u8]) -> EngineResult<()> {
        if id == properties::DEVICE_NAME {
            return Err(EngineError::PropertyReadOnly(id.0));
        }
        let mut props = self.props.lock().unwrap();
        match props.get_mut(&id.0) {
            Some(existing) => {
                if existing.len() != data.len() {
                    return Err(EngineError::PropertySizeMismatch {
                        id: id.0,
                        expected: existing.len(),
                        actual: data.len(),
                    });
                }
                existing.copy_from_slice(data);
                Ok(())
            }
            None => Err(EngineError::UnknownProperty(id.0)),
        }
    }

    fn get_property(&self, id: PropertyId) -> EngineResult<Vec<u8>> {
        if id == properties::DEVICE_NAME {
            return Ok(b"mock input".to_vec());
        }
        self.props
            .lock()
            .unwrap()
            .get(&id.0)
            .cloned()
            .ok_or(EngineError::UnknownProperty(id.0))
    }

    fn set_parameter(&self, id: ParameterId, value: f32) -> EngineResult<()> {
        let mut params = self.params.lock().unwrap();
        match params.get_mut(&id.0) {
            Some(existing) => {
                *existing = value;
                Ok(())
            }
            None => Err(EngineError::UnknownParameter(id.0)),
        }
    }

    fn get_parameter(&self, id: ParameterId) -> EngineResult<f32> {
        self.params
            .lock()
            .unwrap()
            .get(&id.0)
            .copied()
            .ok_or(EngineError::UnknownParameter(id.0))
    }
}

/// Factory that records every engine it creates so tests can drive them
pub(crate) struct MockFactory {
    engines: Mutex<Vec<Arc<MockEngine>>>,
    fail_create: AtomicBool,
    alignment: usize,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Self::with_alignment(1)
    }

    pub fn with_alignment(alignment: usize) -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            alignment,
        })
    }

    pub fn script_create_failure(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn allow_create(&self) {
        self.fail_create.store(false, Ordering::SeqCst);
    }

    /// The most recently created engine
    pub fn latest(&self) -> Arc<MockEngine> {
        self.engines
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no engine created yet")
    }

    pub fn created_count(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}

impl CaptureEngineFactory for Arc<MockFactory> {
    fn create(
        &self,
        _format: &AudioFormat,
        _config: &QueueConfig,
        handler: CompletionHandler,
    ) -> EngineResult<Arc<dyn CaptureEngine>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::NoDevices);
        }
        let engine = Arc::new(MockEngine::new(handler, self.alignment));
        self.engines.lock().unwrap().push(engine.clone());
        Ok(engine)
    }
}
