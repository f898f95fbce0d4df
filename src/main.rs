use anyhow::Result;
use devbw::config::Config;

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::parse_or_exit();
    run(&config)
}

#[cfg(feature = "cuda")]
fn run(config: &Config) -> Result<()> {
    use devbw::{device::CudaBackend, report};
    use std::io;

    let backend = CudaBackend::new()?;
    report::write_report(&backend, config, &mut io::stdout().lock())
}

#[cfg(not(feature = "cuda"))]
fn run(_config: &Config) -> Result<()> {
    Err(devbw::device::error::DeviceUnavailable.into())
}
