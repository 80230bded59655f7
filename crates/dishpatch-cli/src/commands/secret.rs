//! Shared secret generation.

use dishpatch_core::SharedSecret;
use dishpatch_core::config::ENV_SHARED_SECRET;
use serde_json::json;

use super::GlobalArgs;
use crate::ui;

/// Print a fresh 256-bit secret.
///
/// Every service that must accept the same tokens needs this exact value.
pub fn run_generate(global: &GlobalArgs) {
    let secret = SharedSecret::generate_hex();

    if global.json {
        println!("{}", json!({ "sharedSecret": secret }));
        return;
    }

    ui::success("Generated shared secret");
    println!();
    println!("  export {ENV_SHARED_SECRET}={secret}");
    println!();
    ui::info("Set the same value on every service that should accept these tokens.");
}
