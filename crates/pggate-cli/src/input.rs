use crate::cli::ConfigPath;
use anyhow::Context;
use pggate::{GatewayConfig, QueryRequest};
use std::path::Path;
use tokio::io::{AsyncBufRead, BufReader};

pub type RequestReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Load the config file; a missing default file yields the defaults.
pub fn load_config(config: &ConfigPath) -> anyhow::Result<GatewayConfig> {
    if !config.explicit && !config.path.exists() {
        tracing::debug!(path = %config.path.display(), "no config file; using defaults");
        return Ok(GatewayConfig::new());
    }
    GatewayConfig::load(&config.path)
        .with_context(|| format!("failed to load config {}", config.path.display()))
}

pub async fn open_input(path: Option<&Path>) -> anyhow::Result<RequestReader> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Option<Result<QueryRequest, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn skips_blank_and_comment_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
        assert!(parse_line("# select widgets").is_none());
    }

    #[test]
    fn parses_requests() {
        let req = parse_line(r#" {"action":"select","table":"widgets"} "#)
            .unwrap()
            .unwrap();
        assert_eq!(req.target(), "widgets");
        assert!(parse_line(r#"{"action":"drop","table":"widgets"}"#)
            .unwrap()
            .is_err());
    }

    #[test]
    fn missing_default_config_uses_defaults() {
        let config = load_config(&ConfigPath {
            path: PathBuf::from("definitely-not-here/pggate.toml"),
            explicit: false,
        })
        .unwrap();
        assert_eq!(config, GatewayConfig::new());

        assert!(
            load_config(&ConfigPath {
                path: PathBuf::from("definitely-not-here/pggate.toml"),
                explicit: true,
            })
            .is_err()
        );
    }
}
