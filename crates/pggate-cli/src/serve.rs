use crate::cli::RunArgs;
use crate::input::{load_config, open_input, parse_line};
use anyhow::Context;
use pggate::{
    Gateway, GatewayError, QueryResponse, SessionContext, create_pool_from_config,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)?;
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(url) = args.database.clone() {
        config.database.url = url;
    }

    let session: SessionContext = args.session.iter().cloned().collect();
    session.validate()?;

    let pool = create_pool_from_config(&config)?;
    let gateway = Gateway::from_config(pool, &config)?;
    tracing::info!(
        tables = gateway.allow_lists().tables.len(),
        functions = gateway.allow_lists().functions.names().len(),
        "gateway ready"
    );

    let mut lines = open_input(args.input.as_deref()).await?.lines();
    let mut stdout = tokio::io::stdout();
    let mut served = 0usize;
    let mut failed = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        let Some(parsed) = parse_line(&line) else {
            continue;
        };
        let response = match parsed {
            Ok(request) => gateway.run_query(request, &session).await,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                QueryResponse::failure(GatewayError::Transport(format!("invalid request: {e}")))
            }
        };
        served += 1;
        if !response.is_ok() {
            failed += 1;
        }

        let mut out = serde_json::to_string(&response).context("failed to encode response")?;
        out.push('\n');
        stdout
            .write_all(out.as_bytes())
            .await
            .context("failed to write response")?;
        stdout.flush().await.context("failed to write response")?;
    }

    tracing::info!(served, failed, "input exhausted");
    Ok(())
}
