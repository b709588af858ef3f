use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "habit",
    version,
    about = "habitgrid: daily habit tracking with calendar heatmaps",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "habitrc")]
    pub habitrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// A command line split into habit selectors, the command, and its
/// arguments: `habit [selector...] <command> [args...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub selectors: Vec<String>,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        if tokens.is_empty() {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "list".to_string());
            debug!(command = %cmd, "no explicit command, using default");
            return Ok(Self {
                selectors: vec![],
                command: cmd,
                command_args: vec![],
            });
        }

        if tokens.len() == 1 && tokens[0].parse::<u64>().is_ok() {
            debug!(token = %tokens[0], "single numeric token interpreted as habit info query");
            return Ok(Self {
                selectors: vec![tokens[0].clone()],
                command: "info".to_string(),
                command_args: vec![],
            });
        }

        let known = crate::commands::known_command_names();
        for (i, token) in tokens.iter().enumerate() {
            if let Some(full) = crate::commands::expand_command_abbrev(token, &known) {
                debug!(
                    token = %token,
                    expanded = %full,
                    split_index = i,
                    "resolved command token"
                );
                return Ok(Self {
                    selectors: tokens[..i].to_vec(),
                    command: full.to_string(),
                    command_args: tokens[i + 1..].to_vec(),
                });
            }
        }

        Err(anyhow!(
            "no command found in '{}'; run `habit help`",
            tokens.join(" ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Invocation> {
        Invocation::parse(
            &Config::default(),
            args.iter().map(OsString::from).collect(),
        )
    }

    #[test]
    fn empty_args_use_default_command() {
        let inv = parse(&[]).expect("parse");
        assert_eq!(inv.command, "list");
        assert!(inv.selectors.is_empty());
    }

    #[test]
    fn lone_number_means_info() {
        let inv = parse(&["3"]).expect("parse");
        assert_eq!(inv.command, "info");
        assert_eq!(inv.selectors, vec!["3"]);
    }

    #[test]
    fn selectors_precede_abbreviated_command() {
        let inv = parse(&["2", "vi", "days:30"]).expect("parse");
        assert_eq!(inv.selectors, vec!["2"]);
        assert_eq!(inv.command, "view");
        assert_eq!(inv.command_args, vec!["days:30"]);
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert!(parse(&["frobnicate"]).is_err());
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let raw: Vec<OsString> = ["habit", "rc.heatmap.days:30", "list"]
            .iter()
            .map(OsString::from)
            .collect();
        let pre = preprocess_args(&raw).expect("preprocess");
        assert_eq!(pre.cleaned_args.len(), 2);
        assert_eq!(
            pre.rc_overrides,
            vec![("rc.heatmap.days".to_string(), "30".to_string())]
        );
    }
}
