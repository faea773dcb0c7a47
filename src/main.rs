//! Purpose: `physx-shim` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable JSON on stdout; logs go to stderr only.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use physx_shim::api::{Arch, Error, ErrorKind, LOG_ENV, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run `physx-shim --help` for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode).map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

#[derive(Parser)]
#[command(
    name = "physx-shim",
    version,
    about = "Verify the PhysX native runtime before the managed wrapper loads it",
    long_about = None,
    after_help = r#"EXAMPLES
  $ physx-shim check
  $ physx-shim check --arch x86
  $ physx-shim survey --manifest physx.json
  $ physx-shim resolve PhysXCore64.dll
  $ physx-shim version C:\Windows\System32\PhysXLoader64.dll

ENVIRONMENT
  PHYSX_SHIM_MANIFEST   manifest file used when --manifest is absent
  PHYSX_SHIM_LOG        tracing filter for stderr logs (default: warn)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ArchCli {
    X64,
    X86,
}

impl From<ArchCli> for Arch {
    fn from(value: ArchCli) -> Self {
        match value {
            ArchCli::X64 => Arch::X64,
            ArchCli::X86 => Arch::X86,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
struct ManifestArgs {
    #[arg(
        long,
        help = "Manifest JSON file (overrides PHYSX_SHIM_MANIFEST)",
        value_hint = ValueHint::FilePath
    )]
    manifest: Option<PathBuf>,
    #[arg(long, value_enum, help = "Built-in manifest to use (default: this build's)")]
    arch: Option<ArchCli>,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Verify every required library; stop at the first failure",
        long_about = r#"Verify that every required PhysX library is present at its exact version.

Libraries are searched next to the executable, in the system directory,
in %WINDIR%, in the current directory, and then along PATH. The first
missing or mismatched library fails the check."#
    )]
    Check {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    #[command(about = "Report the state of every required library")]
    Survey {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    #[command(arg_required_else_help = true, about = "Show where a library file resolves")]
    Resolve {
        #[arg(help = "Library file name, e.g. PhysXCore64.dll")]
        file: String,
    },
    #[command(arg_required_else_help = true, about = "Print the version resource of an image")]
    Version {
        #[arg(help = "Path to a DLL or EXE", value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    #[command(about = "Print the manifest that would be checked")]
    Manifest {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ physx-shim completion bash > ~/.local/share/bash-completion/completions/physx-shim
  $ physx-shim completion zsh > ~/.zfunc/_physx-shim"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn now_rfc3339() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::MissingLibrary => "library is missing".to_string(),
        ErrorKind::VersionMismatch => "library version mismatch".to_string(),
        ErrorKind::Configuration => "configuration error".to_string(),
        ErrorKind::Corrupt => "unreadable library image".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Observer => "dispose observer failed".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(library) = err.library() {
        inner.insert("library".to_string(), json!(library));
    }
    if let Some(found) = err.found() {
        inner.insert("found".to_string(), json!(found));
    }
    if let Some(required) = err.required() {
        inner.insert("required".to_string(), json!(required));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    for cause in error_causes(err) {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{error_json, error_text};
    use physx_shim::api::{Error, ErrorKind, FileVersion};

    #[test]
    fn error_json_carries_versions_and_library() {
        let err = Error::new(ErrorKind::VersionMismatch)
            .with_message("wrong version")
            .with_library("PhysXDevice64.dll")
            .with_versions(FileVersion::new(1, 2, 3, 4), FileVersion::new(1, 2, 3, 5));
        let value = error_json(&err);
        let inner = &value["error"];
        assert_eq!(inner["kind"], "VersionMismatch");
        assert_eq!(inner["library"], "PhysXDevice64.dll");
        assert_eq!(inner["found"], "1.2.3.4");
        assert_eq!(inner["required"], "1.2.3.5");
    }

    #[test]
    fn error_text_without_color_has_plain_labels() {
        let err = Error::new(ErrorKind::MissingLibrary)
            .with_message("PhysX library \"PhysXCore64.dll\" is missing.")
            .with_hint("install it");
        let text = error_text(&err, false);
        assert!(text.starts_with("error: PhysX library"));
        assert!(text.contains("\nhint: install it"));
        assert!(!text.contains('\u{1b}'));
    }
}
