#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examlock::run().await {
        eprintln!("examlock fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
