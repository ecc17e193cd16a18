use anyhow::Result;
use clap::Parser;
use ioh_sales_chat::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    ioh_sales_chat::run(args).await
}
