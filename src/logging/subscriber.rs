//! Tracing subscriber wiring for provisioning runs.
//!
//! Every event the [`Logger`](super::Logger) emits carries a target that
//! encodes its role in the run: stage banners, per-step results, and dry-run
//! previews each get their own. The console and file renderings diverge from
//! there, so the console shows color and icons while the file gets
//! timestamped plain text.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// Targets the logger emits run-structure events under.
pub(super) mod targets {
    /// Stage banner opening a step or section.
    pub const STAGE: &str = "benchup::stage";
    /// Result line emitted as the runner finishes a step.
    pub const STEP: &str = "benchup::step";
    /// Preview of an action suppressed by dry-run mode.
    pub const DRY_RUN: &str = "benchup::dry_run";
}

/// The role an event plays in a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEvent {
    Stage,
    StepResult,
    Preview,
    Error,
    Warning,
    Detail,
    Diagnostic,
}

/// Map an event's target and level onto its role in the run.
///
/// Warnings and errors keep their severity no matter which target emitted
/// them, so a failing stage still renders as an error.
fn classify(target: &str, level: tracing::Level) -> RunEvent {
    match level {
        tracing::Level::ERROR => RunEvent::Error,
        tracing::Level::WARN => RunEvent::Warning,
        tracing::Level::INFO if target == targets::STAGE => RunEvent::Stage,
        tracing::Level::INFO if target == targets::STEP => RunEvent::StepResult,
        tracing::Level::INFO if target == targets::DRY_RUN => RunEvent::Preview,
        tracing::Level::INFO => RunEvent::Detail,
        _ => RunEvent::Diagnostic,
    }
}

/// Console rendering. Step result lines arrive already colored by status,
/// so they are only indented here.
fn console_line(kind: RunEvent, msg: &str) -> String {
    match kind {
        RunEvent::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
        RunEvent::Preview => format!("  \x1b[33m[DRY RUN]\x1b[0m {msg}"),
        RunEvent::Error => format!("\x1b[31mERROR\x1b[0m {msg}"),
        RunEvent::Warning => format!("\x1b[33mWARN\x1b[0m  {msg}"),
        RunEvent::StepResult | RunEvent::Detail => format!("  {msg}"),
        RunEvent::Diagnostic => format!("  \x1b[2m{msg}\x1b[0m"),
    }
}

/// File rendering: timestamp prefix and a role tag, no ANSI.
fn file_line(kind: RunEvent, ts: &str, msg: &str) -> String {
    match kind {
        RunEvent::Stage => format!("[{ts}] ==> {msg}"),
        RunEvent::StepResult => format!("[{ts}]     [step] {msg}"),
        RunEvent::Preview => format!("[{ts}]     [dry run] {msg}"),
        RunEvent::Error => format!("[{ts}]     [error] {msg}"),
        RunEvent::Warning => format!("[{ts}]     [warn] {msg}"),
        RunEvent::Detail => format!("[{ts}]     {msg}"),
        RunEvent::Diagnostic => format!("[{ts}]     [debug] {msg}"),
    }
}

/// Pull the `message` field out of an event.
fn message_of(event: &tracing::Event<'_>) -> String {
    #[derive(Default)]
    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "message" {
                self.0 = value.to_string();
            }
        }
    }

    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);
    visitor.0
}

/// A [`tracing_subscriber::Layer`] that appends every event to the
/// persistent run log.
///
/// The file captures `DEBUG` and above regardless of console verbosity, so
/// a failed run can be diagnosed after the fact without re-running verbose.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Start a fresh run log for `command` and return the layer feeding it.
    ///
    /// Returns `None` if the state directory cannot be created or the file
    /// cannot be opened; the run then proceeds with console output only.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let version =
            option_env!("BENCHUP_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let header = format!(
            "# benchup {version}, `{command}` run started {}\n",
            format_utc_datetime(),
        );
        fs::write(&path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let kind = classify(metadata.target(), *metadata.level());
        let msg = strip_ansi(&message_of(event));
        let line = file_line(kind, &format_utc_time(), &msg);

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console event formatter that renders by run role instead of by the
/// usual level-and-target prefix.
struct ConsoleFormat;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let kind = classify(metadata.target(), *metadata.level());
        writeln!(writer, "{}", console_line(kind, &message_of(event)))
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Console output goes to stdout with warnings and errors diverted to
/// stderr; the file layer under `$XDG_STATE_HOME/benchup/<command>.log`
/// captures everything down to `DEBUG`. Must be called once at program
/// startup, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .and(std::io::stdout.with_min_level(tracing::Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormat)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
