//! Input capture queue
//!
//! The queue manager owns a buffer pool and a capture engine binding, and
//! coordinates two execution contexts: the client thread issuing
//! start/pause/stop/reset, and the engine's callback thread delivering
//! filled buffers. A single mutex around the queue state is the boundary
//! between them; the completion path takes it only to snapshot state and
//! clone the engine handle, then releases it before re-enqueueing or
//! calling the delegate, so the callback never stalls behind a client
//! control call and a delegate may call back into the queue.
//!
//! Control calls return `bool` rather than `Result`: a request that is
//! invalid for the current state fails with no side effects, and failures
//! never leave the queue half-transitioned.

use std::sync::{Arc, Mutex, Weak};

use crate::buffer::{BufferPool, CaptureBuffer};
use crate::config::QueueConfig;
use crate::engine::cpal_engine::CpalEngineFactory;
use crate::engine::{
    CaptureEngine, CaptureEngineFactory, Completion, CompletionHandler, EngineError, EnqueueError,
    ParameterId, PropertyId,
};
use crate::error::{QueueError, QueueResult};
use crate::format::AudioFormat;

/// Lifecycle state of an input queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Constructed (or reset); buffers allocated but not enqueued
    Created,
    /// Capturing; completions are delivered to the delegate
    Running,
    /// Not accepting new data; completed buffers are re-enqueued silently
    Paused,
    /// No further completions will fire; restart requires `reset`
    Stopped,
}

/// Receives capture notifications on the engine's callback thread.
///
/// Handlers must not perform long-blocking work: each call stalls all
/// subsequent capture completions for this queue.
pub trait InputQueueDelegate: Send + Sync {
    /// One filled capture buffer, in the order the engine completed it.
    /// `data` is an independent copy; the underlying buffer has already
    /// been handed back to the engine.
    fn on_data(&self, data: &[u8], packets: u32);

    /// An asynchronous engine fault. The queue stays in its current state;
    /// the caller decides whether to stop.
    fn on_error(&self, error: &QueueError);
}

struct QueueInner {
    state: QueueState,
    /// None only after a failed reset disposed the old binding
    engine: Option<Arc<dyn CaptureEngine>>,
    pool: BufferPool,
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    /// Non-owning observer registration: never keeps the delegate alive,
    /// liveness is checked before each delivery
    delegate: Weak<dyn InputQueueDelegate>,
}

impl QueueShared {
    /// Completion trampoline target, invoked on the engine callback thread.
    fn handle_completion(&self, completion: Completion) {
        match completion {
            Completion::Data { mut buffer, packets } => {
                // The copy is mandatory: the buffer is reused the instant
                // it goes back to the engine.
                let data = buffer.filled().to_vec();

                let (state, engine) = {
                    let inner = self.inner.lock().unwrap();
                    (inner.state, inner.engine.clone())
                };

                match state {
                    QueueState::Running | QueueState::Paused => {
                        buffer.clear();
                        if let Some(engine) = engine {
                            if let Err(EnqueueError { buffer, reason }) = engine.enqueue(buffer) {
                                // The rejected buffer always returns to the
                                // pool. A `Stopped` rejection means a stop
                                // won the race against this completion; that
                                // is a clean drain-down, not a fault.
                                self.inner.lock().unwrap().pool.put(buffer);
                                if !matches!(reason, EngineError::Stopped) {
                                    log::warn!("Failed to re-enqueue capture buffer: {}", reason);
                                    self.notify_error(&QueueError::Engine(reason));
                                }
                            }
                        }
                    }
                    QueueState::Stopped | QueueState::Created => {
                        // Draining down; the buffer returns to the pool
                        self.inner.lock().unwrap().pool.put(buffer);
                    }
                }

                if state == QueueState::Running {
                    if let Some(delegate) = self.delegate.upgrade() {
                        delegate.on_data(&data, packets);
                    }
                }
            }
            Completion::Error(e) => {
                log::warn!("Capture engine reported: {}", e);
                self.notify_error(&QueueError::Engine(e));
            }
        }
    }

    fn notify_error(&self, error: &QueueError) {
        match self.delegate.upgrade() {
            Some(delegate) => delegate.on_error(error),
            None => log::debug!("Delegate gone; dropping error: {}", error),
        }
    }
}

/// Captures raw PCM from an input device into a small set of rotating
/// buffers and delivers each filled buffer to a delegate.
pub struct InputQueue {
    shared: Arc<QueueShared>,
    factory: Box<dyn CaptureEngineFactory>,
    /// Serializes start/pause/stop/reset between client threads.
    /// Never held while a completion is being handled.
    control: Mutex<()>,
    format: AudioFormat,
    config: QueueConfig,
    buffer_size: usize,
}

impl InputQueue {
    /// Create a queue bound to a cpal capture engine.
    ///
    /// Fails if the format or config is invalid, or the engine cannot be
    /// created for this format (e.g. device unavailable).
    pub fn new(
        format: AudioFormat,
        config: QueueConfig,
        delegate: Weak<dyn InputQueueDelegate>,
    ) -> QueueResult<Self> {
        Self::with_factory(format, config, delegate, Box::new(CpalEngineFactory))
    }

    /// Create a queue with a caller-supplied engine factory.
    pub fn with_factory(
        format: AudioFormat,
        config: QueueConfig,
        delegate: Weak<dyn InputQueueDelegate>,
        factory: Box<dyn CaptureEngineFactory>,
    ) -> QueueResult<Self> {
        format.validate()?;
        config.validate()?;

        // The shared state must exist before the engine so the completion
        // handler can capture a weak reference to it.
        let shared = Arc::new(QueueShared {
            inner: Mutex::new(QueueInner {
                state: QueueState::Created,
                engine: None,
                pool: BufferPool::empty(),
            }),
            delegate,
        });

        let (engine, pool) = Self::build_binding(factory.as_ref(), &format, &config, &shared)?;
        let buffer_size = pool.buffer_size();
        {
            let mut inner = shared.inner.lock().unwrap();
            inner.engine = Some(engine);
            inner.pool = pool;
        }

        log::info!(
            "Input queue created: {}Hz x{} {}-bit, {} buffers x {} bytes",
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
            config.buffer_count,
            buffer_size
        );

        Ok(Self {
            shared,
            factory,
            control: Mutex::new(()),
            format,
            config,
            buffer_size,
        })
    }

    /// Create one engine binding plus a matching pool.
    ///
    /// The handler closure is the callback trampoline: it recovers the
    /// owning queue through a weak reference and dispatches into it, and
    /// silently goes inert once the queue is gone.
    fn build_binding(
        factory: &dyn CaptureEngineFactory,
        format: &AudioFormat,
        config: &QueueConfig,
        shared: &Arc<QueueShared>,
    ) -> QueueResult<(Arc<dyn CaptureEngine>, BufferPool)> {
        let weak = Arc::downgrade(shared);
        let handler: CompletionHandler = Box::new(move |completion| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_completion(completion);
            }
        });

        let engine = factory.create(format, config, handler)?;
        let pool = BufferPool::new(
            format,
            config.buffer_duration_secs,
            config.buffer_count,
            engine.buffer_alignment(),
        )?;
        Ok((engine, pool))
    }

    /// The format this queue was constructed with.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Requested duration of each capture buffer (seconds).
    pub fn buffer_duration(&self) -> f64 {
        self.config.buffer_duration_secs
    }

    /// Byte capacity of each capture buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of rotating capture buffers.
    pub fn buffer_count(&self) -> usize {
        self.config.buffer_count
    }

    pub fn state(&self) -> QueueState {
        self.shared.inner.lock().unwrap().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == QueueState::Running
    }

    /// Whether an engine binding is attached (false after a failed reset).
    pub fn available(&self) -> bool {
        self.shared.inner.lock().unwrap().engine.is_some()
    }

    /// Buffers currently held by the pool rather than the engine. Equals
    /// `buffer_count` before start and after any failed start; drops to zero
    /// while the engine owns the full rotation.
    pub fn pooled_buffers(&self) -> usize {
        self.shared.inner.lock().unwrap().pool.available()
    }

    /// Begin capturing (from `Created`) or resume (from `Paused`).
    ///
    /// From `Created`, every pool buffer is enqueued with the engine and
    /// the engine is started; on any engine rejection the buffers are
    /// reclaimed and the state is unchanged.
    pub fn start(&self) -> bool {
        let _ctl = self.control.lock().unwrap();
        let (state, engine) = {
            let inner = self.shared.inner.lock().unwrap();
            (inner.state, inner.engine.clone())
        };
        let Some(engine) = engine else {
            log::warn!("start: no capture engine (reset failed?)");
            return false;
        };

        match state {
            QueueState::Created => {
                let mut buffers = {
                    let mut inner = self.shared.inner.lock().unwrap();
                    inner.pool.take_all()
                };
                let count = buffers.len();

                while let Some(buffer) = buffers.pop() {
                    if let Err(EnqueueError { buffer, reason }) = engine.enqueue(buffer) {
                        log::warn!("start: engine rejected buffer: {}", reason);
                        // The rejected buffer plus everything not yet handed
                        // over goes straight back to the pool; reclaim covers
                        // the buffers the engine already accepted.
                        buffers.push(buffer);
                        self.rollback_start(&*engine, buffers);
                        self.shared.notify_error(&QueueError::Engine(reason));
                        return false;
                    }
                }

                // Transition before the engine runs so the first completion
                // can never observe a pre-Running state and drain its buffer
                self.shared.inner.lock().unwrap().state = QueueState::Running;
                if let Err(e) = engine.start() {
                    log::warn!("start: engine refused to start: {}", e);
                    self.shared.inner.lock().unwrap().state = QueueState::Created;
                    self.rollback_start(&*engine, Vec::new());
                    self.shared.notify_error(&QueueError::Engine(e));
                    return false;
                }

                log::info!("Input queue running ({} buffers enqueued)", count);
                true
            }
            QueueState::Paused => {
                if let Err(e) = engine.start() {
                    log::warn!("start: engine refused to resume: {}", e);
                    self.shared.notify_error(&QueueError::Engine(e));
                    return false;
                }
                self.shared.inner.lock().unwrap().state = QueueState::Running;
                log::info!("Input queue resumed");
                true
            }
            QueueState::Running | QueueState::Stopped => {
                log::debug!("start ignored in state {:?}", state);
                false
            }
        }
    }

    /// Undo a failed start: pull every pending buffer back from the engine
    /// and return it, plus any buffers never handed over, to the pool. After
    /// this the pool holds its full complement again.
    fn rollback_start(&self, engine: &dyn CaptureEngine, unconsumed: Vec<CaptureBuffer>) {
        let reclaimed = engine.reclaim();
        let mut inner = self.shared.inner.lock().unwrap();
        for buffer in unconsumed.into_iter().chain(reclaimed) {
            inner.pool.put(buffer);
        }
    }

    /// Stop accepting new data. Buffers already filled still complete and
    /// are re-enqueued, but nothing is delivered until `start` resumes.
    pub fn pause(&self) -> bool {
        let _ctl = self.control.lock().unwrap();
        let engine = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.state != QueueState::Running {
                log::debug!("pause ignored in state {:?}", inner.state);
                return false;
            }
            inner.state = QueueState::Paused;
            inner.engine.clone()
        };

        let Some(engine) = engine else { return false };
        match engine.pause() {
            Ok(()) => {
                log::info!("Input queue paused");
                true
            }
            Err(e) => {
                log::warn!("pause: engine refused: {}", e);
                self.shared.inner.lock().unwrap().state = QueueState::Running;
                self.shared.notify_error(&QueueError::Engine(e));
                false
            }
        }
    }

    /// Stop capturing. Synchronizing barrier: when this returns `true`, no
    /// further delegate notification will fire for this queue. Buffers
    /// still owned by the engine are reclaimed by the engine itself.
    pub fn stop(&self) -> bool {
        let _ctl = self.control.lock().unwrap();
        let (prev, engine) = {
            let mut inner = self.shared.inner.lock().unwrap();
            match inner.state {
                QueueState::Running | QueueState::Paused => {
                    let prev = inner.state;
                    inner.state = QueueState::Stopped;
                    (prev, inner.engine.clone())
                }
                state => {
                    log::debug!("stop ignored in state {:?}", state);
                    return false;
                }
            }
        };

        let Some(engine) = engine else { return false };
        // Engine stop is the quiescence barrier; must not hold the inner
        // lock here or an in-flight completion could deadlock against it.
        match engine.stop() {
            Ok(()) => {
                log::info!("Input queue stopped");
                true
            }
            Err(e) => {
                log::warn!("stop: engine refused: {}", e);
                self.shared.inner.lock().unwrap().state = prev;
                self.shared.notify_error(&QueueError::Engine(e));
                false
            }
        }
    }

    /// Dispose the engine binding and buffer pool and rebuild both with the
    /// same format and duration, returning the queue to a startable state.
    ///
    /// Only valid from `Stopped` (stop has already quiesced the callback
    /// thread). On failure the queue remains `Stopped`.
    pub fn reset(&self) -> bool {
        let _ctl = self.control.lock().unwrap();
        {
            let inner = self.shared.inner.lock().unwrap();
            if inner.state != QueueState::Stopped {
                log::debug!("reset ignored in state {:?}", inner.state);
                return false;
            }
        }

        // Dispose the old binding before creating the new one: the device
        // may be exclusive.
        let old = self.shared.inner.lock().unwrap().engine.take();
        drop(old);

        match Self::build_binding(self.factory.as_ref(), &self.format, &self.config, &self.shared)
        {
            Ok((engine, pool)) => {
                let mut inner = self.shared.inner.lock().unwrap();
                inner.engine = Some(engine);
                inner.pool = pool;
                inner.state = QueueState::Created;
                log::info!("Input queue reset");
                true
            }
            Err(e) => {
                log::warn!("reset: failed to rebuild engine: {}", e);
                self.shared.notify_error(&e);
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Property/parameter pass-through
    // ─────────────────────────────────────────────────────────────
    //
    // Direct pass-through to the engine's property table; no caching, no
    // validation beyond what the engine itself performs. Some properties
    // are only honored before start; the effect of setting them while
    // running is engine-defined and the caller's responsibility.

    pub fn set_property(&self, id: PropertyId, data: &[u8]) -> QueueResult<()> {
        Ok(self.engine_handle()?.set_property(id, data)?)
    }

    pub fn get_property(&self, id: PropertyId) -> QueueResult<Vec<u8>> {
        Ok(self.engine_handle()?.get_property(id)?)
    }

    pub fn set_parameter(&self, id: ParameterId, value: f32) -> QueueResult<()> {
        Ok(self.engine_handle()?.set_parameter(id, value)?)
    }

    pub fn get_parameter(&self, id: ParameterId) -> QueueResult<f32> {
        Ok(self.engine_handle()?.get_parameter(id)?)
    }

    fn engine_handle(&self) -> QueueResult<Arc<dyn CaptureEngine>> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .engine
            .clone()
            .ok_or(QueueError::NotAvailable)
    }
}

impl Drop for InputQueue {
    fn drop(&mut self) {
        // Disposal reaches Stopped; the engine binding is dropped with us
        let _ = self.stop();
    }
}
