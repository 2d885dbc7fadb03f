fn main() {
    // Only run the ESP-IDF build system when cross-compiling for the chip.
    // Build scripts run on the host, so we check the TARGET env var; the
    // espidf suffix covers both Xtensa and RISC-V parts.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("espidf") {
            embuild::espidf::sysenv::output();
        }
    }
}
