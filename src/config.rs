use std::process::exit;

const DEFAULT_LOOP_COUNT: u32 = 50;

/// Run configuration, parsed once from the command line and immutable
/// afterwards.
#[derive(Clone, Copy, Debug, clap::Parser)]
#[command(
    name = "devbw",
    about = "Measures host to device transfer bandwidth over 18 buffer sizes."
)]
pub struct Config {
    /// Timed copies per size class, must be greater than 1.
    #[arg(
        short = 'l',
        long = "loop_count",
        default_value_t = DEFAULT_LOOP_COUNT,
        value_parser = clap::value_parser!(u32).range(2..),
    )]
    pub loop_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loop_count: DEFAULT_LOOP_COUNT,
        }
    }
}

impl Config {
    /// Parses the process arguments. Prints usage and exits 1 on bad
    /// arguments, and after `--help`.
    pub fn parse_or_exit() -> Self {
        use clap::Parser;
        Self::try_parse().unwrap_or_else(|err| {
            let _ = err.print();
            exit(1)
        })
    }
}
