use std::path::PathBuf;

// The private key is baked into the image. Point SIGNER_PRIVATE_KEY at the
// key file, or drop it next to Cargo.toml as private_key.pem.
fn main() {
    println!("cargo:rerun-if-env-changed=SIGNER_PRIVATE_KEY");
    let source = std::env::var("SIGNER_PRIVATE_KEY").unwrap_or_else(|_| "private_key.pem".to_string());
    println!("cargo:rerun-if-changed={source}");

    let out = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set")).join("private_key.pem");
    if let Err(e) = std::fs::copy(&source, &out) {
        panic!("cannot read private key from {source}: {e} (set SIGNER_PRIVATE_KEY)");
    }

    embuild::espidf::sysenv::output();
}
