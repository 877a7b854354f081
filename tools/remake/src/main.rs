fn main() {
    match remake::run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("remake: {error}");
            std::process::exit(1);
        }
    }
}
