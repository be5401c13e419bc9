use gcloud_log_dispatch::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::main().await?;
    Ok(())
}
