use std::sync::Arc;

use cust::{
    context::{Context, CurrentContext},
    device::{Device, DeviceAttribute},
    error::CudaResult,
    event::{Event, EventFlags},
    memory::{CopyDestination, DeviceBuffer, LockedBuffer},
    stream::{Stream, StreamFlags},
};
use log::{debug, info};

use super::{error::RuntimeCallError, Backend, DeviceEngine, Direction, TimingWindow};

fn check<T>(call: &'static str, result: CudaResult<T>) -> Result<T, RuntimeCallError> {
    result.map_err(|err| RuntimeCallError::new(call, err))
}

fn get_device(ordinal: usize) -> Result<Device, RuntimeCallError> {
    check("Device::get_device", Device::get_device(ordinal as u32))
}

/// The CUDA runtime.
///
/// Initializes the driver once; engines are opened per device.
pub struct CudaBackend {
    devices: usize,
}

impl CudaBackend {
    pub fn new() -> Result<Self, RuntimeCallError> {
        check("cust::init", cust::init(cust::CudaFlags::empty()))?;
        let devices = check("Device::num_devices", Device::num_devices())? as usize;
        info!("cuda initialized, {devices} device(s)");
        Ok(Self { devices })
    }
}

impl Backend for CudaBackend {
    type Engine = CudaEngine;

    fn device_count(&self) -> Result<usize, RuntimeCallError> {
        Ok(self.devices)
    }
    fn bus_id(&self, ordinal: usize) -> Result<String, RuntimeCallError> {
        let device = get_device(ordinal)?;
        let attribute = |attr| check("Device::get_attribute", device.get_attribute(attr));
        let domain = attribute(DeviceAttribute::PciDomainId)?;
        let bus = attribute(DeviceAttribute::PciBusId)?;
        let slot = attribute(DeviceAttribute::PciDeviceId)?;
        Ok(format!("{domain:04x}:{bus:02x}:{slot:02x}.0"))
    }
    fn engine(&self, ordinal: usize) -> Result<CudaEngine, RuntimeCallError> {
        CudaEngine::new(ordinal)
    }
}

/// One CUDA device, made current for the calling thread.
pub struct CudaEngine {
    stream: Arc<Stream>,
    #[allow(unused)]
    context: Context,
}

impl CudaEngine {
    fn new(ordinal: usize) -> Result<Self, RuntimeCallError> {
        let device = get_device(ordinal)?;
        if let Ok(name) = device.name() {
            debug!("device {ordinal}: {name}");
        }
        let context = check("Context::new", Context::new(device))?;
        let stream = check("Stream::new", Stream::new(StreamFlags::DEFAULT, None))?;
        Ok(Self {
            stream: Arc::new(stream),
            context,
        })
    }
}

impl DeviceEngine for CudaEngine {
    type HostBuffer = LockedBuffer<f64>;
    type DeviceBuffer = DeviceBuffer<f64>;
    type Timing = CudaTiming;

    fn alloc_host(&self, len: usize) -> Result<LockedBuffer<f64>, RuntimeCallError> {
        // page-locked; the caller fills it before any copy reads it
        check("LockedBuffer::uninitialized", unsafe {
            LockedBuffer::uninitialized(len)
        })
    }
    fn alloc_device(&self, len: usize) -> Result<DeviceBuffer<f64>, RuntimeCallError> {
        check("DeviceBuffer::uninitialized", unsafe {
            DeviceBuffer::uninitialized(len)
        })
    }
    fn copy(
        &self,
        host: &mut LockedBuffer<f64>,
        device: &mut DeviceBuffer<f64>,
        direction: Direction,
    ) -> Result<(), RuntimeCallError> {
        match direction {
            Direction::HostToDevice => check("DeviceBuffer::copy_from", device.copy_from(&host[..])),
            Direction::DeviceToHost => check("DeviceBuffer::copy_to", device.copy_to(&mut host[..])),
        }
    }
    fn synchronize(&self) -> Result<(), RuntimeCallError> {
        check("CurrentContext::synchronize", CurrentContext::synchronize())
    }
    fn timing(&self) -> Result<CudaTiming, RuntimeCallError> {
        let start = check("Event::new", Event::new(EventFlags::DEFAULT))?;
        let stop = check("Event::new", Event::new(EventFlags::DEFAULT))?;
        Ok(CudaTiming {
            stream: self.stream.clone(),
            start,
            stop,
        })
    }
}

/// Start and stop events recorded on the engine's stream.
pub struct CudaTiming {
    stream: Arc<Stream>,
    start: Event,
    stop: Event,
}

impl TimingWindow for CudaTiming {
    fn record_start(&mut self) -> Result<(), RuntimeCallError> {
        check("Event::record", self.start.record(&self.stream))
    }
    fn record_stop(&mut self) -> Result<(), RuntimeCallError> {
        check("Event::record", self.stop.record(&self.stream))
    }
    fn elapsed_ms(&mut self) -> Result<f64, RuntimeCallError> {
        check("Event::synchronize", self.stop.synchronize())?;
        let ms = check(
            "Event::elapsed_time_f32",
            self.stop.elapsed_time_f32(&self.start),
        )?;
        Ok(ms.into())
    }
}
