// memory.x comes from embassy-stm32's `memory-x` feature; only the firmware
// binary links against the cortex-m-rt and defmt scripts.
fn main() {
    if std::env::var_os("CARGO_FEATURE_FIRMWARE").is_some() {
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}
