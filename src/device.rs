/*!
Accelerator runtimes behind one seam.

A [`Backend`] enumerates devices and hands out a [`DeviceEngine`] per
device. The engine owns everything one measurement pass needs: pinned
host allocations, device allocations, blocking copies in either
[`Direction`], a full device barrier, and a [`TimingWindow`] of
device-side markers.

`CudaBackend` drives real hardware and requires the "cuda" feature.
[`SimBackend`] is always compiled and backs the tests.
*/

use std::{fmt, ops::DerefMut};

use error::RuntimeCallError;

#[cfg(feature = "cuda")]
mod cuda_engine;
#[cfg(feature = "cuda")]
pub use cuda_engine::CudaBackend;

mod sim_engine;
pub use sim_engine::{SimBackend, SimEngine};

pub mod error {
    use std::fmt::Display;

    /** Device is unavailable.

    - The "cuda" feature is not enabled.
    */
    #[derive(Clone, Copy, Debug, thiserror::Error)]
    #[error("DeviceUnavailable")]
    pub struct DeviceUnavailable;

    /// A runtime call failed.
    ///
    /// Fatal to the run: nothing is retried, and no measurement from the
    /// failing pass is reported.
    #[derive(Debug, thiserror::Error)]
    #[error("{call} failed: {message}")]
    pub struct RuntimeCallError {
        call: &'static str,
        message: String,
    }

    impl RuntimeCallError {
        pub(crate) fn new(call: &'static str, message: impl Display) -> Self {
            Self {
                call,
                message: message.to_string(),
            }
        }
        /// The runtime call that failed.
        pub fn call(&self) -> &'static str {
            self.call
        }
    }
}

/// Direction of a host <-> device copy.
///
/// Selects which buffer is the source and which is the destination; a
/// measurement pass is identical in every other respect.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
}

impl Direction {
    /// Both directions, in report order.
    pub const ALL: [Self; 2] = [Self::HostToDevice, Self::DeviceToHost];

    pub fn label(self) -> &'static str {
        match self {
            Self::HostToDevice => "H2D",
            Self::DeviceToHost => "D2H",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Enumerates devices and opens engines on them.
pub trait Backend {
    type Engine: DeviceEngine;

    /// Number of visible devices.
    fn device_count(&self) -> Result<usize, RuntimeCallError>;
    /// PCI bus id of the device at `ordinal`, as `domain:bus:device.function`.
    fn bus_id(&self, ordinal: usize) -> Result<String, RuntimeCallError>;
    /// Makes the device at `ordinal` current and returns its engine.
    fn engine(&self, ordinal: usize) -> Result<Self::Engine, RuntimeCallError>;
}

/// One device's runtime surface.
///
/// Copies and barriers are blocking. Timing is taken on the device via
/// [`TimingWindow`], not with host clocks.
pub trait DeviceEngine {
    /// Pinned allocation, readable and writable from the host.
    type HostBuffer: DerefMut<Target = [f64]>;
    type DeviceBuffer;
    type Timing: TimingWindow;

    fn alloc_host(&self, len: usize) -> Result<Self::HostBuffer, RuntimeCallError>;
    fn alloc_device(&self, len: usize) -> Result<Self::DeviceBuffer, RuntimeCallError>;
    /// Copies the full buffer once in `direction`. Both buffers are taken
    /// mutably since the direction decides which one is written.
    fn copy(
        &self,
        host: &mut Self::HostBuffer,
        device: &mut Self::DeviceBuffer,
        direction: Direction,
    ) -> Result<(), RuntimeCallError>;
    /// Blocks until all work previously issued to the device has completed.
    fn synchronize(&self) -> Result<(), RuntimeCallError>;
    /// A fresh pair of start/stop markers.
    fn timing(&self) -> Result<Self::Timing, RuntimeCallError>;
}

/// Device-side markers bracketing one timed copy loop.
pub trait TimingWindow {
    fn record_start(&mut self) -> Result<(), RuntimeCallError>;
    fn record_stop(&mut self) -> Result<(), RuntimeCallError>;
    /// Blocks until the stop marker has completed, then returns the time
    /// between the markers in milliseconds.
    fn elapsed_ms(&mut self) -> Result<f64, RuntimeCallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_labels() {
        assert_eq!(Direction::HostToDevice.label(), "H2D");
        assert_eq!(Direction::DeviceToHost.label(), "D2H");
        assert_eq!(
            Direction::ALL,
            [Direction::HostToDevice, Direction::DeviceToHost]
        );
    }

    #[test]
    fn runtime_call_error_display() {
        let err = RuntimeCallError::new("Event::record", "invalid resource handle");
        assert_eq!(err.call(), "Event::record");
        assert_eq!(
            err.to_string(),
            "Event::record failed: invalid resource handle"
        );
    }
}
