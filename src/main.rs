use anyhow::{Context, Error, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use log::LevelFilter;
use ripline::{
    line_buffer::{LineBufferBuilder, LineBufferReader},
    lines::LineIter,
};
use std::io::{self, Write};
use std::process::ExitCode;

use georecord::input::{process_line, FileOrStdin, LineOutcome};
use georecord::{Config, GeoipFilter, MmdbLookup, RecordBuilder};

const DEFAULT_DATABASE: &str = "/usr/share/GeoIP/GeoLite2-City.mmdb";

/// Check if the error chain contains a broken pipe error.
#[inline(always)]
fn is_broken_pipe(err: &Error) -> bool {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::BrokenPipe {
                return true;
            }
        }
    }
    false
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file with geoip_lookup_key, enable_key_* or record
    /// templates, skip_adding_null_record and tag options
    #[clap(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    config: Utf8PathBuf,

    /// GeoLite2/GeoIP2 City database. Overrides geoip_database from the
    /// configuration file
    #[clap(
        short,
        long,
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath,
        env = "GEOIP_DATABASE"
    )]
    database: Option<Utf8PathBuf>,

    /// Tag for input lines that are plain record objects
    #[clap(short, long, default_value = "geoip")]
    tag: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[clap(short, long)]
    quiet: bool,

    /// Newline-delimited JSON input file(s). Leave empty or use "-" to read from stdin
    #[clap(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    input: Vec<Utf8PathBuf>,
}

fn init_logger(args: &Args) {
    let mut builder = env_logger::Builder::from_default_env();
    let level = match (args.quiet, args.verbose) {
        (true, _) => Some(LevelFilter::Error),
        (false, 0) => None,
        (false, 1) => Some(LevelFilter::Info),
        (false, 2) => Some(LevelFilter::Debug),
        (false, _) => Some(LevelFilter::Trace),
    };
    match level {
        Some(level) => {
            builder.filter_level(level);
        }
        None if std::env::var_os("RUST_LOG").is_none() => {
            builder.filter_level(LevelFilter::Warn);
        }
        None => {}
    }
    // ignore a second initialisation
    let _ = builder.try_init();
}

fn main() -> ExitCode {
    let err = match run_main() {
        Ok(code) => return code,
        Err(err) => err,
    };

    if is_broken_pipe(&err) {
        return ExitCode::SUCCESS;
    }

    // Print detailed error information based on environment variables
    let mut stderr = io::stderr();
    if std::env::var("RUST_BACKTRACE").is_ok_and(|v| v == "1")
        && std::env::var("RUST_LIB_BACKTRACE").map_or(true, |v| v == "1")
    {
        let _ = writeln!(stderr, "{:?}", err);
    } else {
        let _ = writeln!(stderr, "{:#}", err);
    }

    ExitCode::FAILURE
}

fn run_main() -> Result<ExitCode> {
    let mut args = Args::parse();
    init_logger(&args);

    let config = Config::from_path(&args.config)
        .with_context(|| format!("failed to load configuration {}", args.config))?;

    let database = args
        .database
        .clone()
        .or_else(|| config.geoip_database.clone())
        .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE));

    // validate the templates before touching the database
    let builder = RecordBuilder::from_config(&config).context("invalid configuration")?;
    let rewriter = config.tag_rewriter().context("invalid configuration")?;

    let lookup = MmdbLookup::open(&database)?;
    let filter = GeoipFilter::from_parts(lookup, builder, rewriter);

    // if no files specified, add stdin
    if args.input.is_empty() {
        args.input.push(Utf8PathBuf::from("-"));
    }

    run(&args, &filter)?;
    Ok(ExitCode::SUCCESS)
}

fn run(args: &Args, filter: &GeoipFilter<MmdbLookup>) -> Result<()> {
    let mut out = io::BufWriter::with_capacity(65536, io::stdout());
    let mut line_buffer = LineBufferBuilder::new().capacity(65536).build();

    for path in &args.input {
        let file = FileOrStdin::from_path(path.clone());
        let reader = file
            .reader()
            .with_context(|| format!("failed to open {}", file))?;
        let mut lb_reader = LineBufferReader::new(reader, &mut line_buffer);
        let mut lineno = 0usize;

        while lb_reader.fill().with_context(|| format!("failed to read {}", file))? {
            let buffer = lb_reader.buffer();
            for line in LineIter::new(b'\n', buffer) {
                lineno += 1;
                if process_line(line, filter, &args.tag, &mut out)? == LineOutcome::PassedThrough {
                    log::warn!("{}:{}: not a JSON record, passing through", file, lineno);
                }
            }
            lb_reader.consume_all();
        }
        out.flush()?;
    }

    Ok(())
}
