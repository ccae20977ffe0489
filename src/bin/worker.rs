#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = learnhub_grading::run_worker().await {
        eprintln!("learnhub-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
