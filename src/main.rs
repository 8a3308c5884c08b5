fn main() {
    if let Err(e) = weft::cli::run_cli() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
