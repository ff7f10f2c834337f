use anyhow::{Context, Result};
use clap::Parser;
use idlewake::analysis::IdleWakeupAnalyzer;
use idlewake::cli::{Cli, OutputFormat};
use idlewake::input::SampleReader;
use idlewake::report::WakeupReport;
use idlewake::serializer::ProfileSerializer;
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if args.top == 0 {
        anyhow::bail!("Invalid value for --top: 0 (must be >= 1)");
    }

    init_tracing(args.debug);

    let config = args
        .analysis_config()
        .context("Invalid analysis configuration")?;
    let mut analyzer = IdleWakeupAnalyzer::new(&config)?;

    for sample in SampleReader::open(&args.samples)? {
        analyzer.process(&sample?);
    }

    let trace_name = args
        .samples
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.samples.display().to_string());
    let output = analyzer.finish(&trace_name);

    let report =
        WakeupReport::from_store(&output.store, &trace_name, output.duration_secs, args.top);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => report.write_text(&mut out)?,
        OutputFormat::Json => writeln!(out, "{}", report.to_json()?)?,
    }
    out.flush()?;

    if let Some(path) = &args.profile {
        let bytes = ProfileSerializer::new(output.profile)
            .write_to_path(path)
            .with_context(|| format!("Failed to export profile to {}", path.display()))?;
        eprintln!("Wrote {} bytes to {}", bytes, path.display());
    }

    Ok(())
}
