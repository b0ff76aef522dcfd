#[tokio::main]
async fn main() -> anyhow::Result<()> {
    babi_upload::start_server().await
}
