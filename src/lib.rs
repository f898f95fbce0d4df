#![forbid(unsafe_op_in_unsafe_fn)]

/*!
Host to device transfer-bandwidth benchmark.

Measures blocking copy bandwidth between pinned host memory and device
memory for buffers of 2^10 to 2^27 doubles, in both directions, on every
visible device. Timing is taken with device-side markers, so the numbers
reflect what the device saw, not host call overhead.

The real runtime lives behind the "cuda" feature. Without it the library
still builds and the [`SimBackend`](device::SimBackend) stands in for
hardware, which is how the tests run. Diagnostics go to stderr via
[`log`], controlled by `RUST_LOG`; the report itself is plain stdout.
*/

pub mod result {
    pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
}

pub mod config;
pub mod device;
pub mod report;
pub mod transfer;
