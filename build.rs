use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let build_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=GHF_BUILD_TIMESTAMP={build_ts}");

    if let Ok(tag) = std::env::var("GHF_RELEASE_TAG") {
        println!("cargo:rustc-env=GHF_RELEASE_TAG={tag}");
    }
}
