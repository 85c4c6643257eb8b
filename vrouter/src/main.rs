use vrouter::cli::initialize_from_arguments;

#[tokio::main]
async fn main() {
    println!("vrouter v{}", env!("CARGO_PKG_VERSION"));
    match initialize_from_arguments().await {
        Ok(status) => println!("Done ({status:?})"),
        Err(e) => {
            eprintln!("vrouter: {e}");
            std::process::exit(1);
        }
    }
}
