#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wa_gateway::node::run_cli().await
}
