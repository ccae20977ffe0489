#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = learnhub_grading::run().await {
        eprintln!("learnhub-grading fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
