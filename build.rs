//! Build script: forwards the release version stamped by the packaging pipeline.

fn main() {
    println!("cargo::rerun-if-env-changed=ZERODHA_VERSION");

    // Release builds set `ZERODHA_VERSION=v1.2.3`; local builds fall back to
    // the crate version at runtime.
    if let Ok(version) = std::env::var("ZERODHA_VERSION") {
        let version = version.trim();
        if !version.is_empty() {
            println!("cargo::rustc-env=ZERODHA_BUILD_VERSION={version}");
        }
    }
}
