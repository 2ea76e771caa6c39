use crate::cli::CheckArgs;
use crate::input::{load_config, open_input, parse_line};
use anyhow::Context;
use pggate::{AllowLists, FunctionAllowList, plan_request};
use tokio::io::AsyncBufReadExt;

pub async fn run(args: CheckArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config)?;
    let lists = AllowLists::new(config.table_allow_list()?, FunctionAllowList::default());
    if lists.tables.is_empty() {
        println!("-- warning: no tables are allow-listed; every table request will be rejected");
    }

    let mut lines = open_input(args.input.as_deref()).await?.lines();
    let mut line_no = 0usize;
    let mut checked = 0usize;
    let mut rejected = 0usize;

    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        line_no += 1;
        let Some(parsed) = parse_line(&line) else {
            continue;
        };
        checked += 1;

        let request = match parsed {
            Ok(request) => request,
            Err(e) => {
                rejected += 1;
                println!("-- line {line_no}: invalid request: {e}\n");
                continue;
            }
        };

        match plan_request(&request, &lists) {
            Ok(statements) => {
                println!(
                    "-- line {line_no}: {} {}",
                    request.action().as_str(),
                    request.target()
                );
                for stmt in statements {
                    println!("{stmt};");
                    println!("-- {} parameter(s)", stmt.params.len());
                }
                println!();
            }
            Err(e) => {
                rejected += 1;
                println!(
                    "-- line {line_no}: rejected ({}): {e}\n",
                    e.kind()
                );
            }
        }
    }

    if rejected > 0 {
        anyhow::bail!("{rejected} of {checked} request(s) rejected");
    }
    println!("-- {checked} request(s) ok");
    Ok(())
}
