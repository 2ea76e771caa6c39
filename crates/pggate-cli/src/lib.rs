mod check;
mod cli;
mod input;
mod serve;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Run(args) => serve::run(args).await,
        cli::Command::Check(args) => check::run(args).await,
    }
}
