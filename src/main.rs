use gabble::utils::diagnostics::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = gabble::cli::main().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
