#[tokio::main]
async fn main() {
    if let Err(e) = drepadata_lib::run().await {
        tracing::error!(error = %e, "Drepadata stopped with an error");
        std::process::exit(1);
    }
}
