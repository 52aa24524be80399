//! Command-line surface: argument definition, parsing and the top-level
//! flow from locating the Mewofile to executing it.

use super::display::{print_ast, print_label};
use super::error::AppError;
use super::file::read_lines;
use super::json::to_json;
use super::parser::Parser;
use super::path::find_config_file;
use super::runtime::{ExecOptions, Runtime};
use super::scan::is_identifier;
use crate::constants::{
    APP_NAME, ARG_LABEL, ARG_REST, FLAG_AST_JSON, FLAG_COMPLETIONS, FLAG_DEBUG, FLAG_DEFINE,
    FLAG_DISABLE_FEATURE, FLAG_DRY_RUN, FLAG_ENABLE_FEATURE, FLAG_MEWOFILE, FLAG_SHELL,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Everything the command line asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    /// Explicit Mewofile path; otherwise the current directory is searched
    pub mewofile: Option<PathBuf>,
    pub label: Option<String>,
    pub exec: ExecOptions,
    pub debug: bool,
    pub ast_json: bool,
    pub completions: Option<Shell>,
}

pub fn build_cli() -> ClapCommand {
    ClapCommand::new(APP_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run labeled blocks of shell commands from a Mewofile")
        .override_usage("mewo [LABEL] [OPTIONS] [-- ARGS]")
        .after_help("Features are enabled with +F NAME (or +FNAME) and disabled with -F NAME.")
        .arg(
            Arg::new(ARG_LABEL)
                .value_name("LABEL")
                .help("Label to run; the top level runs when omitted"),
        )
        .arg(
            Arg::new(ARG_REST)
                .value_name("ARGS")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Positional arguments available as $0, $1, ..."),
        )
        .arg(
            Arg::new(FLAG_MEWOFILE)
                .long(FLAG_MEWOFILE)
                .short('f')
                .visible_alias("file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the Mewofile"),
        )
        .arg(
            Arg::new(FLAG_DEFINE)
                .short('D')
                .long(FLAG_DEFINE)
                .value_name("NAME=VALUE")
                .action(ArgAction::Append)
                .value_parser(parse_define)
                .help("Override a variable (-Dname=value or -D name=value)"),
        )
        .arg(
            Arg::new(FLAG_ENABLE_FEATURE)
                .long(FLAG_ENABLE_FEATURE)
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Enable a feature (also +FNAME or +F NAME)"),
        )
        .arg(
            Arg::new(FLAG_DISABLE_FEATURE)
                .short('F')
                .long(FLAG_DISABLE_FEATURE)
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Disable a feature (-FNAME or -F NAME)"),
        )
        .arg(
            Arg::new(FLAG_SHELL)
                .long(FLAG_SHELL)
                .value_name("SHELL")
                .help("Default shell for every command"),
        )
        .arg(
            Arg::new(FLAG_DEBUG)
                .long(FLAG_DEBUG)
                .short('d')
                .action(ArgAction::SetTrue)
                .help("Print the parsed statements and enable debug logging"),
        )
        .arg(
            Arg::new(FLAG_DRY_RUN)
                .long(FLAG_DRY_RUN)
                .short('n')
                .action(ArgAction::SetTrue)
                .help("Print commands without executing them"),
        )
        .arg(
            Arg::new(FLAG_AST_JSON)
                .long(FLAG_AST_JSON)
                .action(ArgAction::SetTrue)
                .help("Print the parsed statements as JSON and exit"),
        )
        .arg(
            Arg::new(FLAG_COMPLETIONS)
                .long(FLAG_COMPLETIONS)
                .value_name("SHELL")
                .value_parser(value_parser!(Shell))
                .help("Print a shell completion script and exit"),
        )
}

/// Parses a `-D` value: `name=value`, or a bare `name` for the empty string.
pub fn parse_define(text: &str) -> Result<(String, String), String> {
    let (name, value) = text.split_once('=').unwrap_or((text, ""));
    let name = name.trim();
    if !is_identifier(name) {
        return Err(format!("invalid variable name '{}'", name));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Rewrites `+F` spellings into `--enable-feature` and splits off the
/// arguments after the first `--`.
///
/// # Arguments
///
/// * `args` - Full argument vector, program name first
///
/// # Returns
///
/// Returns the arguments for clap and the arguments after `--`.
pub fn preprocess_args(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let enable_flag = format!("--{}", FLAG_ENABLE_FEATURE);
    let mut flags = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            return (flags, iter.collect());
        }
        match arg.strip_prefix("+F") {
            Some("") => {
                flags.push(enable_flag.clone());
                if let Some(name) = iter.next() {
                    flags.push(name);
                }
            }
            Some(name) => {
                flags.push(enable_flag.clone());
                flags.push(name.to_string());
            }
            None => flags.push(arg),
        }
    }

    (flags, Vec::new())
}

/// Parses the process arguments.
///
/// # Errors
///
/// Returns the clap error for unknown flags or bad values, and for
/// `--help`/`--version`, which the caller prints.
pub fn parse_args(args: Vec<String>) -> Result<CliOptions, clap::Error> {
    let (flags, trailing) = preprocess_args(args);
    let matches = build_cli().try_get_matches_from(flags)?;
    Ok(options_from_matches(&matches, trailing))
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn options_from_matches(matches: &ArgMatches, trailing: Vec<String>) -> CliOptions {
    let mut args = strings(matches, ARG_REST);
    args.extend(trailing);

    let overrides = matches
        .get_many::<(String, String)>(FLAG_DEFINE)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    CliOptions {
        mewofile: matches.get_one::<PathBuf>(FLAG_MEWOFILE).cloned(),
        label: matches.get_one::<String>(ARG_LABEL).cloned(),
        exec: ExecOptions {
            dry_run: matches.get_flag(FLAG_DRY_RUN),
            shell: matches
                .get_one::<String>(FLAG_SHELL)
                .filter(|s| !s.trim().is_empty())
                .cloned(),
            enable_features: strings(matches, FLAG_ENABLE_FEATURE),
            disable_features: strings(matches, FLAG_DISABLE_FEATURE),
            overrides,
            args,
        },
        debug: matches.get_flag(FLAG_DEBUG),
        ast_json: matches.get_flag(FLAG_AST_JSON),
        completions: matches.get_one::<Shell>(FLAG_COMPLETIONS).copied(),
    }
}

/// Locates, parses and runs the Mewofile.
///
/// # Errors
///
/// Returns `NotFound` when no Mewofile exists, `Io` when it cannot be read
/// and `Script` for any parse or execution error.
pub fn run(options: CliOptions) -> Result<(), AppError> {
    if let Some(shell) = options.completions {
        generate(shell, &mut build_cli(), APP_NAME, &mut io::stdout());
        return Ok(());
    }

    let path = match options.mewofile {
        Some(path) => path,
        None => find_config_file().ok_or(AppError::NotFound)?,
    };
    if !path.is_file() {
        return Err(AppError::NotFound);
    }
    debug!(path = %path.display(), "reading Mewofile");

    let lines = read_lines(&path).map_err(|source| AppError::Io {
        path: path.clone(),
        source,
    })?;
    let ast = Parser::from_lines(lines)
        .parse()
        .map_err(|error| AppError::script(&path, error))?;

    if options.ast_json {
        println!("{}", to_json(&ast)?);
        return Ok(());
    }

    if options.debug {
        match options.label.as_deref() {
            Some(label) => {
                println!("Invoking label: {}", label);
                if !print_label(&ast, label) {
                    debug!(label, "label not found, nothing to list");
                }
            }
            None => {
                println!("No label specified, executing default");
                print_ast(&ast);
            }
        }
    }

    // Bound to a local so it drops before `ast`.
    let mut runtime = Runtime::new(&ast, options.exec);
    let result = runtime
        .execute(options.label.as_deref())
        .map_err(|error| AppError::script(&path, error));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mewoparse::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_preprocess_plus_features() {
        let (flags, rest) = preprocess_args(args(&["mewo", "+Ffast", "+F", "slow", "build"]));
        assert_eq!(
            flags,
            args(&[
                "mewo",
                "--enable-feature",
                "fast",
                "--enable-feature",
                "slow",
                "build"
            ])
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_preprocess_splits_at_double_dash() {
        let (flags, rest) = preprocess_args(args(&["mewo", "test", "--", "+Fx", "--", "a"]));
        assert_eq!(flags, args(&["mewo", "test"]));
        assert_eq!(rest, args(&["+Fx", "--", "a"]));
    }

    #[test]
    fn test_parse_define() {
        assert_eq!(parse_define("mode=fast"), Ok(("mode".into(), "fast".into())));
        assert_eq!(parse_define("url=a=b"), Ok(("url".into(), "a=b".into())));
        assert_eq!(parse_define("flag"), Ok(("flag".into(), String::new())));
        assert!(parse_define("=x").is_err());
        assert!(parse_define("1x=2").is_err());
    }

    #[test]
    fn test_parse_args_full() {
        let options = parse_args(args(&[
            "mewo",
            "build",
            "extra",
            "-Dmode=release",
            "-D",
            "jobs=4",
            "+Flto",
            "-Fdocs",
            "--shell",
            "bash",
            "--dry-run",
            "-f",
            "other/Mewofile",
            "--",
            "x",
            "y",
        ]))
        .unwrap();

        assert_eq!(options.label.as_deref(), Some("build"));
        assert_eq!(options.mewofile, Some(PathBuf::from("other/Mewofile")));
        assert_eq!(
            options.exec,
            ExecOptions {
                dry_run: true,
                shell: Some("bash".to_string()),
                enable_features: args(&["lto"]),
                disable_features: args(&["docs"]),
                overrides: vec![
                    ("mode".to_string(), "release".to_string()),
                    ("jobs".to_string(), "4".to_string()),
                ],
                args: args(&["extra", "x", "y"]),
            }
        );
    }

    #[test]
    fn test_parse_args_defaults() {
        let options = parse_args(args(&["mewo"])).unwrap();
        assert_eq!(options, CliOptions::default());

        let options = parse_args(args(&["mewo", "--file", "M", "--ast-json", "-d"])).unwrap();
        assert_eq!(options.mewofile, Some(PathBuf::from("M")));
        assert!(options.ast_json);
        assert!(options.debug);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(args(&["mewo", "--bogus"])).is_err());
        assert!(parse_args(args(&["mewo", "-D", "9=1"])).is_err());
        let err = parse_args(args(&["mewo", "--version"])).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_run_reports_missing_file() {
        let options = CliOptions {
            mewofile: Some(PathBuf::from("/no/such/dir/Mewofile")),
            ..CliOptions::default()
        };
        assert!(matches!(run(options), Err(AppError::NotFound)));
    }

    #[test]
    fn test_debug_unknown_label_is_runtime_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Mewofile");
        fs::write(&path, "build:\n    echo hi\n").unwrap();
        let options = CliOptions {
            mewofile: Some(path),
            label: Some("deploy".to_string()),
            debug: true,
            ..CliOptions::default()
        };

        match run(options) {
            Err(AppError::Script { error, .. }) => {
                assert_eq!(error.kind, ErrorKind::Runtime);
                assert_eq!(error.line, 0);
                assert_eq!(error.message, "Unknown label 'deploy'");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
