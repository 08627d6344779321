use std::borrow::Cow;

use rust_embed::RustEmbed;

pub const WEIGHT_RULES_ASSET: &str = "commodity_weight_rules.csv";
pub const NET_WEIGHTS_ASSET: &str = "net_weights.csv";

/// Reference tables shipped inside the binary.
#[derive(RustEmbed)]
#[folder = "assets"]
struct EmbeddedAssets;

/// Returns the raw bytes of an embedded asset, if present.
pub fn load_asset(path: &str) -> Option<Cow<'static, [u8]>> {
    EmbeddedAssets::get(&canonical_asset_path(path)).map(|file| file.data)
}

fn canonical_asset_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if let Some(rest) = trimmed.strip_prefix("assets/") {
        rest.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_paths_accept_folder_prefix() {
        assert_eq!(canonical_asset_path("/assets/net_weights.csv"), "net_weights.csv");
        assert_eq!(canonical_asset_path("net_weights.csv"), "net_weights.csv");
    }

    #[test]
    fn reference_tables_are_embedded() {
        assert!(load_asset(WEIGHT_RULES_ASSET).is_some());
        assert!(load_asset(NET_WEIGHTS_ASSET).is_some());
        assert!(load_asset("missing.csv").is_none());
    }
}
