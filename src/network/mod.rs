// file: src/network/mod.rs
// version: 1.2.0
// guid: a1b2c3d4-e5f6-7890-1234-567890abcde2

//! Source bundle retrieval

pub mod download;

pub use download::Downloader;

/// GitHub archive URL for a DietPi source bundle
pub fn bundle_url(owner: &str, branch: &str) -> String {
    format!("https://github.com/{owner}/DietPi/archive/{branch}.tar.gz")
}

/// Top-level directory GitHub archives unpack to
pub fn bundle_root_dir(branch: &str) -> String {
    format!("DietPi-{branch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_url_shape() {
        assert_eq!(
            bundle_url("MichaIng", "master"),
            "https://github.com/MichaIng/DietPi/archive/master.tar.gz"
        );
        assert_eq!(
            bundle_url("SomeFork", "dev"),
            "https://github.com/SomeFork/DietPi/archive/dev.tar.gz"
        );
    }

    #[test]
    fn test_bundle_root_dir() {
        assert_eq!(bundle_root_dir("beta"), "DietPi-beta");
    }
}
