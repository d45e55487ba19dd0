fn main() {
    if let Err(err) = league_scheduler_lib::run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
