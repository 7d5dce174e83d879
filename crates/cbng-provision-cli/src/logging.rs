use tracing_subscriber::EnvFilter;

use crate::render::OutputStyle;
use crate::LogFormat;

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub(crate) fn init_tracing(verbose: u8, format: LogFormat, style: OutputStyle) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, style)));

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// The stage spinner owns stderr in rich mode, so quiet runs only surface
/// warnings there.
pub(crate) fn default_filter(verbose: u8, style: OutputStyle) -> &'static str {
    match (verbose, style) {
        (0, OutputStyle::Rich) => "warn",
        (0, OutputStyle::Plain) => "warn,cbng_provision_installer=info,cbng_provision_cli=info",
        (1, _) => "info,cbng_provision_installer=debug,cbng_provision_cli=debug",
        _ => "debug,cbng_provision_installer=trace,cbng_provision_cli=trace",
    }
}
