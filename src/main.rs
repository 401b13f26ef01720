fn main() {
    if let Err(error) = client_health_lib::run() {
        eprintln!("client-health: {:#}", error);
        std::process::exit(1);
    }
}
