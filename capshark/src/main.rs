mod config;

use anyhow::{Context, anyhow};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use pkt_replays::analyzer::Analyzer;
use pkt_replays::analyzer::chat::ChatLoggerBuilder;
use pkt_replays::analyzer::packet_dump::PacketDumpBuilder;
use pkt_replays::analyzer::survey::{SurveyBuilder, SurveyStats};
use pkt_replays::state::ReplayState;
use pkt_replays::types::{CaptureTime, ClientBuild};
use pkt_replays::{Capture, CaptureError, CaptureOptions};

use crate::config::CliConfig;

fn init_logging(verbosity: u64, config: &CliConfig) -> anyhow::Result<()> {
    let fallback = match (verbosity, &config.log_filter) {
        (0, Some(filter)) => filter.clone(),
        (0, None) => "warn".to_string(),
        (1, _) => "info".to_string(),
        (2, _) => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .with_context(|| format!("invalid log filter {fallback:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn capture_options(matches: &ArgMatches, config: &CliConfig) -> anyhow::Result<CaptureOptions> {
    let mut options = config.capture.clone();
    if let Some(build) = matches.value_of("BUILD") {
        let build: u32 =
            parse_int::parse(build).map_err(|e| anyhow!("invalid build {build:?}: {e}"))?;
        options.force_build = Some(ClientBuild(build));
    }
    if matches.is_present("LENIENT_DIRECTION") {
        options.strict_legacy_direction = false;
    }
    Ok(options)
}

fn format_time(time: CaptureTime) -> String {
    let seconds = time.seconds();
    let nanos = (seconds.fract() * 1e9) as u32;
    match chrono::DateTime::from_timestamp(seconds.trunc() as i64, nanos) {
        Some(datetime) => datetime.to_rfc3339(),
        None => time.to_string(),
    }
}

fn open_capture(path: &Path, options: &CaptureOptions) -> anyhow::Result<Capture> {
    let capture = Capture::open(path, options.clone())
        .with_context(|| format!("failed to open {}", path.display()))?;
    info!(
        "{}: build {}, started {}",
        path.display(),
        capture.build(),
        format_time(capture.start_time())
    );
    Ok(capture)
}

/// Replays to the end without an analyzer. Malformed payloads are skipped.
fn drive(capture: &mut Capture) -> anyhow::Result<u64> {
    let mut count = 0;
    loop {
        match capture.next_frame() {
            Ok(Some(_)) => count += 1,
            Ok(None) => break,
            Err(CaptureError::Payload { index, opcode, .. }) => {
                debug!("skipped malformed {opcode} frame {index}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(count)
}

fn run_analyzer(
    path: &Path,
    options: &CaptureOptions,
    mut analyzer: Box<dyn Analyzer>,
) -> anyhow::Result<()> {
    let mut capture = open_capture(path, options)?;
    let frames = capture
        .run(analyzer.as_mut())
        .with_context(|| format!("failed to replay {}", path.display()))?;
    info!("{}: {frames} frames", path.display());
    Ok(())
}

fn print_info(path: &Path, options: &CaptureOptions) -> anyhow::Result<()> {
    let mut capture = open_capture(path, options)?;
    let digest = capture.digest()?;
    let frames = drive(&mut capture)?;
    let summary = serde_json::json!({
        "path": path.display().to_string(),
        "sha1": digest,
        "header": capture.header(),
        "headerless": capture.is_headerless(),
        "build": capture.build(),
        "start_time": format_time(capture.start_time()),
        "frames": frames,
        "entities": capture.entities().len(),
        "combat_sessions": capture.combat_sessions().len(),
        "session": capture.session(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_entities(path: &Path, options: &CaptureOptions) -> anyhow::Result<()> {
    let mut capture = open_capture(path, options)?;
    drive(&mut capture)?;
    let entities: Vec<_> = capture.entities().iter().collect();
    println!("{}", serde_json::to_string_pretty(&entities)?);
    Ok(())
}

fn print_combat(path: &Path, options: &CaptureOptions) -> anyhow::Result<()> {
    let mut capture = open_capture(path, options)?;
    drive(&mut capture)?;

    for session in capture.combat_sessions().sessions() {
        let start = session
            .start_time()
            .map(format_time)
            .unwrap_or_else(|| "?".to_string());
        let end = session
            .end_time()
            .map(format_time)
            .unwrap_or_else(|| "open".to_string());
        let duration = session
            .duration()
            .map(|d| format!(" ({d:.3}s)"))
            .unwrap_or_default();
        println!(
            "#{} {} -> {}: {start} .. {end}{duration}",
            session.id,
            capture.display_name(&session.attacker),
            capture.display_name(&session.victim),
        );
    }
    Ok(())
}

/// Files under `root` with the configured extension. A file given directly is always taken.
fn collect_captures(root: &Path, extension: &str) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn survey(roots: &[&str], options: &CaptureOptions, config: &CliConfig) -> anyhow::Result<()> {
    let stats = Rc::new(RefCell::new(SurveyStats::new()));
    let builder = SurveyBuilder::new(stats.clone());
    let mut failures = Vec::new();

    for root in roots {
        for path in collect_captures(Path::new(root), config.extension()) {
            if let Err(e) = run_analyzer(&path, options, builder.build()) {
                warn!("{e:#}");
                failures.push(format!("{}: {e:#}", path.display()));
            }
        }
    }

    let report = serde_json::json!({
        "stats": &*stats.borrow(),
        "failures": failures,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn capture_arg() -> Arg<'static, 'static> {
    Arg::with_name("CAPTURE")
        .help("The capture file to process")
        .required(true)
        .index(1)
}

fn main() -> anyhow::Result<()> {
    let matches = App::new("capshark")
        .about("Replays World of Warcraft packet captures")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("VERBOSE")
                .help("Log more; repeat for more detail")
                .short("v")
                .multiple(true)
                .global(true),
        )
        .arg(
            Arg::with_name("CONFIG")
                .help("TOML configuration file")
                .long("config")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("BUILD")
                .help("Replay as this client build (decimal or 0x-prefixed)")
                .long("build")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("LENIENT_DIRECTION")
                .help("Mark legacy frames with a bad direction byte invalid instead of failing")
                .long("lenient-direction")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("dump")
                .about("Writes every frame as a JSON line")
                .arg(
                    Arg::with_name("HEX")
                        .help("Hexdump payloads of frames without a decoder")
                        .long("hex"),
                )
                .arg(
                    Arg::with_name("OUTPUT")
                        .help("Write to this file instead of stdout")
                        .short("o")
                        .long("output")
                        .takes_value(true),
                )
                .arg(capture_arg()),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Prints header facts and a replay summary")
                .arg(capture_arg()),
        )
        .subcommand(
            SubCommand::with_name("entities")
                .about("Prints the final state and log of every entity as JSON")
                .arg(capture_arg()),
        )
        .subcommand(
            SubCommand::with_name("combat")
                .about("Lists combat sessions")
                .arg(capture_arg()),
        )
        .subcommand(
            SubCommand::with_name("chat")
                .about("Prints chat and text emotes")
                .arg(capture_arg()),
        )
        .subcommand(
            SubCommand::with_name("survey")
                .about("Collects decoder statistics over files and directories")
                .arg(
                    Arg::with_name("PATHS")
                        .help("Capture files or directories to walk")
                        .required(true)
                        .multiple(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("default-config")
                .about("Prints a commented default configuration file"),
        )
        .get_matches();

    let (name, sub) = matches.subcommand();
    let sub = sub.ok_or_else(|| anyhow!("no subcommand given"))?;

    if name == "default-config" {
        print!("{}", CliConfig::generate_default_toml());
        return Ok(());
    }

    let config = match sub.value_of("CONFIG") {
        Some(path) => CliConfig::load(Path::new(path))?,
        None => CliConfig::default(),
    };
    init_logging(sub.occurrences_of("VERBOSE"), &config)?;
    let options = capture_options(sub, &config)?;

    let capture_path = || {
        sub.value_of("CAPTURE")
            .map(Path::new)
            .ok_or_else(|| anyhow!("missing capture path"))
    };

    match name {
        "dump" => {
            let mut builder =
                PacketDumpBuilder::new().hex(config.hex || sub.is_present("HEX"));
            if let Some(output) = sub.value_of("OUTPUT") {
                let file = std::fs::File::create(output)
                    .with_context(|| format!("failed to create {output}"))?;
                builder = builder.output(Box::new(std::io::BufWriter::new(file)));
            }
            run_analyzer(capture_path()?, &options, builder.build())
        }
        "info" => print_info(capture_path()?, &options),
        "entities" => print_entities(capture_path()?, &options),
        "combat" => print_combat(capture_path()?, &options),
        "chat" => run_analyzer(capture_path()?, &options, ChatLoggerBuilder::new().build()),
        "survey" => {
            let roots: Vec<&str> = sub
                .values_of("PATHS")
                .map(|values| values.collect())
                .unwrap_or_default();
            survey(&roots, &options, &config)
        }
        other => Err(anyhow!("unknown subcommand {other}")),
    }
}
