fn main() {
    if let Err(e) = chatdeck::cli::main() {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}
