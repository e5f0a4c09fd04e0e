fn main() {
    println!("cargo:rerun-if-changed=settings.json");

    // ESP-IDF link arguments only exist when cross-compiling for the device.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
