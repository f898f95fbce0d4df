use std::{
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use super::{error::RuntimeCallError, Backend, DeviceEngine, Direction, TimingWindow};

/// Software stand-in for an accelerator runtime.
///
/// Copies move real bytes between heap buffers and every timing window
/// reports the same fixed elapsed time, so reports built on it are
/// deterministic. Counters on [`SimEngine`] record what a run did.
#[derive(Clone, Debug)]
pub struct SimBackend {
    devices: usize,
    elapsed_ms: f64,
    copy_budget: Option<u64>,
}

impl SimBackend {
    pub fn new(devices: usize) -> Self {
        Self {
            devices,
            elapsed_ms: 1.0,
            copy_budget: None,
        }
    }
    /// Elapsed milliseconds reported by every timing window. Defaults to 1.
    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
    /// Each engine fails its first copy after `copies` have been issued.
    pub fn with_copy_budget(mut self, copies: u64) -> Self {
        self.copy_budget = Some(copies);
        self
    }
    fn check(&self, call: &'static str, ordinal: usize) -> Result<(), RuntimeCallError> {
        if ordinal < self.devices {
            Ok(())
        } else {
            Err(RuntimeCallError::new(
                call,
                format!("device index {ordinal} is out of range 0..{}", self.devices),
            ))
        }
    }
}

impl Backend for SimBackend {
    type Engine = SimEngine;

    fn device_count(&self) -> Result<usize, RuntimeCallError> {
        Ok(self.devices)
    }
    fn bus_id(&self, ordinal: usize) -> Result<String, RuntimeCallError> {
        self.check("SimBackend::bus_id", ordinal)?;
        Ok(format!("0000:{:02x}:00.0", ordinal + 1))
    }
    fn engine(&self, ordinal: usize) -> Result<SimEngine, RuntimeCallError> {
        self.check("SimBackend::engine", ordinal)?;
        Ok(SimEngine::new(self.elapsed_ms, self.copy_budget))
    }
}

/// Engine for one simulated device.
#[derive(Debug)]
pub struct SimEngine {
    elapsed_ms: f64,
    copy_budget: Option<u64>,
    copies: AtomicU64,
    uploads: AtomicU64,
    downloads: AtomicU64,
    synchronizations: AtomicU64,
    live_buffers: Arc<AtomicUsize>,
    peak_live_buffers: AtomicUsize,
}

impl SimEngine {
    fn new(elapsed_ms: f64, copy_budget: Option<u64>) -> Self {
        Self {
            elapsed_ms,
            copy_budget,
            copies: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            synchronizations: AtomicU64::new(0),
            live_buffers: Arc::new(AtomicUsize::new(0)),
            peak_live_buffers: AtomicUsize::new(0),
        }
    }
    /// Host to device copies issued so far.
    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }
    /// Device to host copies issued so far.
    pub fn downloads(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }
    /// Full device barriers issued so far.
    pub fn synchronizations(&self) -> u64 {
        self.synchronizations.load(Ordering::Relaxed)
    }
    /// Buffers currently allocated on this engine.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Relaxed)
    }
    /// Most buffers ever allocated at once.
    pub fn peak_live_buffers(&self) -> usize {
        self.peak_live_buffers.load(Ordering::Relaxed)
    }
    fn track_alloc(&self) {
        let live = self.live_buffers.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_live_buffers.fetch_max(live, Ordering::Relaxed);
    }
}

impl DeviceEngine for SimEngine {
    type HostBuffer = SimHostBuffer;
    type DeviceBuffer = SimDeviceBuffer;
    type Timing = SimTiming;

    fn alloc_host(&self, len: usize) -> Result<SimHostBuffer, RuntimeCallError> {
        self.track_alloc();
        Ok(SimHostBuffer {
            data: vec![0f64; len],
            live: self.live_buffers.clone(),
        })
    }
    fn alloc_device(&self, len: usize) -> Result<SimDeviceBuffer, RuntimeCallError> {
        self.track_alloc();
        Ok(SimDeviceBuffer {
            data: vec![0f64; len],
            live: self.live_buffers.clone(),
        })
    }
    fn copy(
        &self,
        host: &mut SimHostBuffer,
        device: &mut SimDeviceBuffer,
        direction: Direction,
    ) -> Result<(), RuntimeCallError> {
        if host.data.len() != device.data.len() {
            return Err(RuntimeCallError::new(
                "SimEngine::copy",
                format!(
                    "length mismatch: host {} != device {}",
                    host.data.len(),
                    device.data.len()
                ),
            ));
        }
        let issued = self.copies.fetch_add(1, Ordering::Relaxed);
        if let Some(budget) = self.copy_budget {
            if issued >= budget {
                return Err(RuntimeCallError::new("SimEngine::copy", "copy budget exhausted"));
            }
        }
        match direction {
            Direction::HostToDevice => {
                device.data.copy_from_slice(&host.data);
                self.uploads.fetch_add(1, Ordering::Relaxed);
            }
            Direction::DeviceToHost => {
                host.data.copy_from_slice(&device.data);
                self.downloads.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
    fn synchronize(&self) -> Result<(), RuntimeCallError> {
        self.synchronizations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn timing(&self) -> Result<SimTiming, RuntimeCallError> {
        Ok(SimTiming {
            elapsed_ms: self.elapsed_ms,
            started: false,
            stopped: false,
        })
    }
}

pub struct SimHostBuffer {
    data: Vec<f64>,
    live: Arc<AtomicUsize>,
}

impl Deref for SimHostBuffer {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl DerefMut for SimHostBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Drop for SimHostBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct SimDeviceBuffer {
    data: Vec<f64>,
    live: Arc<AtomicUsize>,
}

impl Deref for SimDeviceBuffer {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        &self.data
    }
}

impl Drop for SimDeviceBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Timing window with a canned elapsed time.
///
/// Still enforces the marker protocol: the elapsed time can only be read
/// once both markers have been recorded, in order.
#[derive(Debug)]
pub struct SimTiming {
    elapsed_ms: f64,
    started: bool,
    stopped: bool,
}

impl TimingWindow for SimTiming {
    fn record_start(&mut self) -> Result<(), RuntimeCallError> {
        self.started = true;
        Ok(())
    }
    fn record_stop(&mut self) -> Result<(), RuntimeCallError> {
        if !self.started {
            return Err(RuntimeCallError::new(
                "SimTiming::record_stop",
                "start marker not recorded",
            ));
        }
        self.stopped = true;
        Ok(())
    }
    fn elapsed_ms(&mut self) -> Result<f64, RuntimeCallError> {
        if !self.stopped {
            return Err(RuntimeCallError::new(
                "SimTiming::elapsed_ms",
                "stop marker not recorded",
            ));
        }
        Ok(self.elapsed_ms)
    }
}
