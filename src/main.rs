#[tokio::main]
async fn main() -> eyre::Result<()> {
    burrow::run().start().await
}
