use std::env::var;

use dotenvy::dotenv;

const BUILD_VARS: [&str; 3] = ["POLLER_GIT_HASH", "POLLER_GIT_BRANCH", "POLLER_BUILD_TIME"];

fn main() {
    dotenv().ok();

    for name in BUILD_VARS {
        let value = var(name).unwrap_or_else(|_| "unknown".to_string());
        println!("cargo:rustc-env={name}={value}");
        println!("cargo:rerun-if-env-changed={name}");
    }
}
