/*!
The measurement protocol.

For every size class a fresh pinned host buffer and device buffer are
allocated, the host side is filled with random values, the transfer path
is primed with a few untimed copies, and then `loop_count` copies are
timed with device-side markers. One [`Measurement`] comes out per size
class, in increasing size order. All buffers for a class are released
before the next class begins.
*/

use std::{mem::size_of, ops::RangeInclusive};

use log::debug;
use rand::{thread_rng, Rng};

use crate::{
    config::Config,
    device::{error::RuntimeCallError, DeviceEngine, Direction, TimingWindow},
};

/// Size class exponents: buffers of 2^i elements for i in this range.
pub const SIZE_CLASSES: RangeInclusive<u32> = 10..=27;
/// Untimed copies issued before each timed loop.
pub const WARMUP_PASSES: u32 = 5;

const MIB: f64 = (1 << 20) as f64;

/// Elements transferred for one size class.
pub fn element_count(size_class: u32) -> usize {
    1 << size_class
}

/// Bytes transferred per copy for one size class.
pub fn buffer_bytes(size_class: u32) -> usize {
    element_count(size_class) * size_of::<f64>()
}

/// Sustained rate in decimal gigabytes per second over the whole timed
/// loop: `loop_count * bytes` moved in `elapsed_ms`.
pub fn bandwidth_gbps(loop_count: u32, bytes: usize, elapsed_ms: f64) -> f64 {
    (loop_count as f64 * bytes as f64) / (elapsed_ms * 1.0e6)
}

/// One row of the report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub size_class: u32,
    pub bytes: usize,
    /// Time for the whole timed loop, not per copy.
    pub elapsed_ms: f64,
    pub bandwidth_gbps: f64,
}

impl Measurement {
    /// Transfer size in binary MiB. Only the displayed size is binary;
    /// the bandwidth stays decimal.
    pub fn buffer_mib(&self) -> f64 {
        self.bytes as f64 / MIB
    }
}

/// Runs the full protocol in `direction` on one device and returns the
/// 18 measurements in increasing size class order.
///
/// Any runtime failure aborts the pass; measurements taken before the
/// failure are discarded.
pub fn measure<E: DeviceEngine>(
    engine: &E,
    direction: Direction,
    config: &Config,
) -> Result<Vec<Measurement>, RuntimeCallError> {
    let mut rng = thread_rng();
    let mut measurements = Vec::with_capacity(SIZE_CLASSES.count());
    for size_class in SIZE_CLASSES {
        let len = element_count(size_class);
        let bytes = buffer_bytes(size_class);

        let mut host = engine.alloc_host(len)?;
        let mut device = engine.alloc_device(len)?;
        for x in host.iter_mut() {
            *x = rng.gen();
        }
        let mut timing = engine.timing()?;

        for _ in 0..WARMUP_PASSES {
            engine.copy(&mut host, &mut device, direction)?;
        }

        engine.synchronize()?;
        timing.record_start()?;
        for _ in 0..config.loop_count {
            engine.copy(&mut host, &mut device, direction)?;
        }
        timing.record_stop()?;
        let elapsed_ms = timing.elapsed_ms()?;

        let bandwidth_gbps = bandwidth_gbps(config.loop_count, bytes, elapsed_ms);
        debug!(
            "{direction} 2^{size_class}: {} x {bytes} B in {elapsed_ms} ms",
            config.loop_count
        );
        measurements.push(Measurement {
            size_class,
            bytes,
            elapsed_ms,
            bandwidth_gbps,
        });
    }
    Ok(measurements)
}
