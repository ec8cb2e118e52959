use anyhow::Result;
use showmmr_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
