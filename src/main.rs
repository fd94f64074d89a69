#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pwd_shell::app::run().await
}
