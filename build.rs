fn main() {
    // ESP-IDF environment is only needed for Xtensa firmware builds.
    // Build scripts run on the host, so check the TARGET env var.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") {
            embuild::espidf::sysenv::output();
        }
    }
}
