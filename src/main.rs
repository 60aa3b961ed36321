use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxswitch::command::{CommandInterpreter, InterpretContext, Interpretation};
use voxswitch::config::Config;
use voxswitch::device::create_port;
use voxswitch::feedback::{EventSink, SessionEvent};
use voxswitch::phonetic::PhoneticTable;
use voxswitch::session::Supervisor;
use voxswitch::switcher::InputMapping;
use voxswitch::transcript::{LineSourceFactory, SourceFactory};

#[derive(Parser)]
#[command(name = "voxswitch", about = "Voice-controlled video switcher")]
struct Cli {
    /// Configuration file (defaults are used if it does not exist)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Read transcripts from a file instead of stdin
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log device commands instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for transcripts and drive the switcher (default)
    Run,
    /// Show how a phrase is normalized and interpreted
    Normalize {
        #[arg(required = true)]
        words: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if cli.dry_run {
        config.device.dry_run = true;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, cli.script),
        Command::Normalize { words } => {
            normalize(&config, &words.join(" "));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("voxswitch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxswitch=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: Config, script: Option<PathBuf>) -> anyhow::Result<()> {
    let port = create_port(&config.device).context("creating device port")?;
    let factory: Box<dyn SourceFactory> = match script {
        Some(path) => Box::new(LineSourceFactory::from_file(&path)?),
        None => Box::new(LineSourceFactory::stdin()?),
    };

    let (event_tx, event_rx) = flume::unbounded::<SessionEvent>();
    let printer = thread::Builder::new()
        .name("event-printer".into())
        .spawn(move || {
            while let Ok(event) = event_rx.recv() {
                print_event(&event);
            }
        })?;

    let supervisor = Supervisor::new(&config, factory, port, EventSink::new(event_tx));
    let handle = supervisor.handle();
    ctrlc::set_handler(move || {
        warn!("interrupt received");
        handle.request_stop();
    })
    .context("installing Ctrl-C handler")?;

    let report = supervisor.run().context("recognition session failed")?;
    // The supervisor held the last sender, so the printer drains and exits
    let _ = printer.join();

    info!(
        resets = report.resets,
        rotations = report.rotations,
        dispatched = report.commands_dispatched,
        program = %report.switcher.program,
        preview = %report.switcher.preview,
        "session ended"
    );
    Ok(())
}

fn print_event(event: &SessionEvent) {
    let ts = Local::now().format("%H:%M:%S");
    match event {
        SessionEvent::StateChanged(state) => println!("[{}] state: {}", ts, state),
        SessionEvent::Tally { program, preview } => {
            println!("[{}] PGM {:<8} PVW {}", ts, program, preview)
        }
        SessionEvent::Announce(text) => println!("[{}] [say] {}", ts, text),
        SessionEvent::Rejected { command, reason } => {
            println!("[{}] ignored '{}' ({})", ts, command, reason)
        }
        SessionEvent::Heard { .. } | SessionEvent::Dispatched(_) => {}
    }
}

fn normalize(config: &Config, phrase: &str) {
    let table = PhoneticTable::from_config(&config.phonetic);
    let inputs = InputMapping::from_config(&config.switcher);
    let mut interpreter = CommandInterpreter::new(table, inputs, &config.session);

    let interpreted = interpreter.interpret(
        phrase,
        InterpretContext {
            armed: true,
            now: Instant::now(),
        },
    );
    println!("heard:      {}", interpreted.event.raw_text);
    println!("normalized: {}", interpreted.event.normalized);
    match interpreted.outcome {
        Interpretation::Accepted(action) => println!("action:     {:?}", action),
        Interpretation::Rejected(reason) => println!("rejected:   {}", reason),
        Interpretation::Shutdown => println!("action:     shutdown"),
    }
}
