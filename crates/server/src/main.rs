#[tokio::main]
async fn main() -> anyhow::Result<()> {
    axiant_server::start().await
}
