use anyhow::Result;
use devbw::{
    config::Config,
    device::SimBackend,
    report::{self, SUCCESS_SENTINEL, VISIBLE_DEVICES_VAR},
};

fn config(loop_count: u32) -> Config {
    Config { loop_count }
}

fn run_report(backend: &SimBackend, loop_count: u32) -> Result<String> {
    let mut out = Vec::new();
    report::write_report(backend, &config(loop_count), &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn full_report_structure() -> Result<()> {
    std::env::set_var(VISIBLE_DEVICES_VAR, "4,7");
    let backend = SimBackend::new(2);
    let text = run_report(&backend, 2)?;

    // one header per device, labeled from the visible-device list
    assert_eq!(text.matches("Running on HWT ").count(), 2);
    assert!(text.contains("and GPU 4 (RT GPU ID: 0 - GPU BusID 0000:01:00.0)"));
    assert!(text.contains("and GPU 7 (RT GPU ID: 1 - GPU BusID 0000:02:00.0)"));
    assert_eq!(text.matches(&"=".repeat(71)).count(), 4);

    // two direction tables of 18 rows each per device
    assert_eq!(text.matches("----- H2D -----").count(), 2);
    assert_eq!(text.matches("----- D2H -----").count(), 2);
    assert_eq!(text.matches("Buffer = ").count(), 2 * 2 * 18);
    for section in text.split("----- ").skip(1) {
        let rows = section
            .lines()
            .skip(1)
            .take_while(|line| line.starts_with("Buffer = "))
            .count();
        assert_eq!(rows, 18);
    }

    // smallest class: 2 copies of 8192 bytes in the canned 1 ms
    let first_row = text.lines().find(|line| line.starts_with("Buffer = ")).unwrap();
    assert_eq!(
        first_row,
        "Buffer =     0.0078 MiB, Time =     1.0000 ms, Bandwidth =   0.0164 GB/s"
    );

    // sentinel exactly once, as the last non-blank line
    assert_eq!(text.matches(SUCCESS_SENTINEL).count(), 1);
    assert_eq!(
        text.lines().filter(|line| !line.trim().is_empty()).last(),
        Some(SUCCESS_SENTINEL)
    );
    Ok(())
}

#[test]
fn runtime_failure_aborts_without_sentinel() {
    let backend = SimBackend::new(1).with_copy_budget(3);
    let mut out = Vec::new();
    let err = report::write_report(&backend, &config(2), &mut out).unwrap_err();
    assert!(err.to_string().contains("SimEngine::copy"));
    let text = String::from_utf8(out).unwrap();
    // the device header had already been written, no rows had
    assert!(text.contains("Running on HWT "));
    assert!(!text.contains("----- H2D -----"));
    assert!(!text.contains("Buffer = "));
    assert!(!text.contains(SUCCESS_SENTINEL));
}

#[test]
fn no_devices_still_succeeds() -> Result<()> {
    let text = run_report(&SimBackend::new(0), 2)?;
    assert_eq!(text.matches("Running on HWT ").count(), 0);
    assert_eq!(
        text.lines().filter(|line| !line.trim().is_empty()).last(),
        Some(SUCCESS_SENTINEL)
    );
    Ok(())
}

#[cfg(feature = "cuda")]
#[test]
fn cuda_report_end_to_end() -> Result<()> {
    use devbw::device::CudaBackend;

    let backend = CudaBackend::new()?;
    let mut out = Vec::new();
    report::write_report(&backend, &config(2), &mut out)?;
    let text = String::from_utf8(out)?;
    assert_eq!(
        text.lines().filter(|line| !line.trim().is_empty()).last(),
        Some(SUCCESS_SENTINEL)
    );
    Ok(())
}
