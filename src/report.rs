/*!
Report driver.

Walks every visible device, measures both directions, and writes the
tables. Rows for a pass are only written once the whole pass has
completed, so a failed run never leaves partial tables behind. The
sentinel line is written exactly once, after the last device.
*/

use std::{env, io::Write};

use log::info;

use crate::{
    config::Config,
    device::{Backend, Direction},
    result::Result,
    transfer::{self, Measurement},
};

/// Last non-blank line of a successful run.
pub const SUCCESS_SENTINEL: &str = "__SUCCESS__";
/// Environment variable the per-device visibility label is read from.
pub const VISIBLE_DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";

const RULE_WIDTH: usize = 71;

/// Label for the device at `ordinal` from the visible-device list, or
/// "N/A" when the list is unset or shorter than the ordinal.
fn visibility_label(visible: Option<&str>, ordinal: usize) -> String {
    visible
        .and_then(|list| list.split(',').nth(ordinal))
        .map(|entry| entry.trim().to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Hardware thread executing the benchmark, per the scheduler.
#[cfg(target_os = "linux")]
fn hardware_thread() -> i32 {
    // negative only on ancient kernels without the syscall
    unsafe { libc::sched_getcpu() }.max(0)
}

#[cfg(not(target_os = "linux"))]
fn hardware_thread() -> i32 {
    0
}

fn write_header(
    w: &mut impl Write,
    hwt: i32,
    ordinal: usize,
    label: &str,
    bus_id: &str,
) -> std::io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(w)?;
    writeln!(w, "{rule}")?;
    writeln!(
        w,
        "Running on HWT {hwt:03} and GPU {label} (RT GPU ID: {ordinal} - GPU BusID {bus_id})"
    )?;
    writeln!(w, "{rule}")
}

fn write_row(w: &mut impl Write, m: &Measurement) -> std::io::Result<()> {
    writeln!(
        w,
        "Buffer = {:>10.4} MiB, Time = {:>10.4} ms, Bandwidth = {:>8.4} GB/s",
        m.buffer_mib(),
        m.elapsed_ms,
        m.bandwidth_gbps,
    )
}

/// Runs the benchmark on every device of `backend` and writes the full
/// report to `w`. Any failure aborts the run before the sentinel.
pub fn write_report<B: Backend>(backend: &B, config: &Config, w: &mut impl Write) -> Result<()> {
    let visible = env::var(VISIBLE_DEVICES_VAR).ok();
    let hwt = hardware_thread();
    for ordinal in 0..backend.device_count()? {
        let bus_id = backend.bus_id(ordinal)?;
        let engine = backend.engine(ordinal)?;
        let label = visibility_label(visible.as_deref(), ordinal);
        write_header(w, hwt, ordinal, &label, &bus_id)?;
        for direction in Direction::ALL {
            info!("measuring {direction} on device {ordinal}");
            let measurements = transfer::measure(&engine, direction, config)?;
            writeln!(w, "----- {direction} -----")?;
            for m in &measurements {
                write_row(w, m)?;
            }
        }
    }
    writeln!(w, "\n{SUCCESS_SENTINEL}\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{bandwidth_gbps, buffer_bytes};

    #[test]
    fn labels_come_from_the_visible_list() {
        assert_eq!(visibility_label(None, 0), "N/A");
        assert_eq!(visibility_label(Some("3"), 0), "3");
        assert_eq!(visibility_label(Some("0,1"), 1), "1");
        assert_eq!(visibility_label(Some("0, 1"), 1), "1");
        assert_eq!(visibility_label(Some("0,1"), 2), "N/A");
        assert_eq!(visibility_label(Some("GPU-8f0"), 0), "GPU-8f0");
    }

    #[test]
    fn row_is_fixed_point_and_right_justified() {
        let m = Measurement {
            size_class: 10,
            bytes: buffer_bytes(10),
            elapsed_ms: 1.0,
            bandwidth_gbps: bandwidth_gbps(2, buffer_bytes(10), 1.0),
        };
        let mut out = Vec::new();
        write_row(&mut out, &m).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Buffer =     0.0078 MiB, Time =     1.0000 ms, Bandwidth =   0.0164 GB/s\n"
        );
    }

    #[test]
    fn wide_values_keep_four_decimals() {
        let m = Measurement {
            size_class: 27,
            bytes: buffer_bytes(27),
            elapsed_ms: 12345.6789,
            bandwidth_gbps: 123.456789,
        };
        let mut out = Vec::new();
        write_row(&mut out, &m).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Buffer =  1024.0000 MiB, Time = 12345.6789 ms, Bandwidth = 123.4568 GB/s\n"
        );
    }

    #[test]
    fn header_shape() {
        let mut out = Vec::new();
        write_header(&mut out, 12, 0, "N/A", "0000:01:00.0").unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "=".repeat(71));
        assert_eq!(
            lines[2],
            "Running on HWT 012 and GPU N/A (RT GPU ID: 0 - GPU BusID 0000:01:00.0)"
        );
        assert_eq!(lines[3], lines[1]);
    }
}
