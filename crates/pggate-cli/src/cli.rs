use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "pggate.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Run,
    Check,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Run(RunArgs),
    Check(CheckArgs),
}

/// Where the config file path came from. A missing default file is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub explicit: bool,
}

impl Default for ConfigPath {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CONFIG),
            explicit: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: ConfigPath,
    pub database: Option<String>,
    pub session: Vec<(String, String)>,
    /// Request file; stdin when `None`.
    pub input: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub config: ConfigPath,
    pub input: Option<PathBuf>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "run" => parse_run(it.map(|s| s.as_str())),
        "check" => parse_check(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

fn parse_run<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = ConfigPath::default();
    let mut database: Option<String> = None;
    let mut session = Vec::new();
    let mut input: Option<PathBuf> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Run)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = explicit_config(v);
            }
            _ if token.starts_with("--config=") => {
                config = explicit_config(token.trim_start_matches("--config="));
            }
            "--database" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--database requires a value");
                };
                database = Some(v.to_string());
            }
            _ if token.starts_with("--database=") => {
                database = Some(token.trim_start_matches("--database=").to_string());
            }
            "--session" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--session requires a value");
                };
                session.push(parse_setting(v)?);
            }
            _ if token.starts_with("--session=") => {
                session.push(parse_setting(token.trim_start_matches("--session="))?);
            }
            _ if token.starts_with('-') && token != "-" => {
                anyhow::bail!("unknown option: {token}");
            }
            _ => set_input(&mut input, token)?,
        }
    }

    Ok(Command::Run(RunArgs {
        config,
        database,
        session,
        input,
    }))
}

fn parse_check<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = ConfigPath::default();
    let mut input: Option<PathBuf> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Check)),
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = explicit_config(v);
            }
            _ if token.starts_with("--config=") => {
                config = explicit_config(token.trim_start_matches("--config="));
            }
            _ if token.starts_with('-') && token != "-" => {
                anyhow::bail!("unknown option: {token}");
            }
            _ => set_input(&mut input, token)?,
        }
    }

    Ok(Command::Check(CheckArgs { config, input }))
}

fn explicit_config(path: &str) -> ConfigPath {
    ConfigPath {
        path: PathBuf::from(path),
        explicit: true,
    }
}

fn set_input(input: &mut Option<PathBuf>, token: &str) -> anyhow::Result<()> {
    if input.is_some() {
        anyhow::bail!("only one input file may be given (got extra argument: {token})");
    }
    // `-` reads stdin, same as no file.
    if token != "-" {
        *input = Some(PathBuf::from(token));
    }
    Ok(())
}

fn parse_setting(raw: &str) -> anyhow::Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        anyhow::bail!("--session expects key=value, got: {raw}");
    };
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("--session key must not be empty: {raw}");
    }
    Ok((name.to_string(), value.to_string()))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
pggate - allow-listed PostgreSQL query gateway

USAGE:
  pggate <COMMAND> [OPTIONS]

COMMANDS:
  run           Execute JSON-lines requests and print one response per line
  check         Print the SQL each request would execute (no database)

Run `pggate <command> --help` for more."
            );
        }
        HelpTopic::Run => {
            println!(
                "\
USAGE:
  pggate run [OPTIONS] [FILE]

Reads one JSON request per line from FILE (or stdin) and writes one JSON
response per line to stdout. Logs go to stderr; set RUST_LOG to adjust.

OPTIONS:
  --config <FILE>       Config file path (default: pggate.toml)
  --database <URL>      Override database.url and DATABASE_URL
  --session <KEY=VAL>   Session setting applied to every request (repeatable)
  -h, --help            Print help"
            );
        }
        HelpTopic::Check => {
            println!(
                "\
USAGE:
  pggate check [OPTIONS] [FILE]

Validates each request against the allow-lists and prints the SQL it would
run. Exits non-zero if any request is rejected.

OPTIONS:
  --config <FILE>       Config file path (default: pggate.toml)
  -h, --help            Print help"
            );
        }
    }
}
