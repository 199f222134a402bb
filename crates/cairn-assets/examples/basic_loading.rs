//! Basic asset loading example.
//!
//! This example shows:
//! - Building a base archive and a patch archive
//! - Mounting them at different priority tiers from an `AssetConfig`
//! - Registering a custom loader
//! - Scene and global scopes, promotion and sweeps
//! - Processing events

use cairn_assets::prelude::*;
use cairn_test_utils::{ArchiveBuilder, Codec, TestTree};

/// A tiny "key=value" settings asset.
#[derive(Debug)]
struct Settings {
    entries: Vec<(String, String)>,
}

impl Asset for Settings {
    fn type_name() -> &'static str {
        "Settings"
    }
}

struct SettingsLoader;

impl AssetLoader for SettingsLoader {
    type Asset = Settings;

    fn default_extension(&self) -> Option<&str> {
        Some("INI")
    }

    fn load(&self, ctx: LoadContext<'_>) -> AssetResult<Self::Asset> {
        let text = std::str::from_utf8(ctx.bytes)
            .map_err(|e| ctx.error(format!("Invalid UTF-8: {}", e)))?;

        let entries = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Ok(Settings { entries })
    }
}

fn main() {
    cairn_core::logging::init();

    let tree = TestTree::new();
    tree.archive(
        "core.arc",
        ArchiveBuilder::new()
            .file("hello.txt", b"Hello from core")
            .file_with("video.ini", b"width=1280\nheight=720\n", Codec::Deflate),
    );
    tree.archive(
        "patch.arc",
        ArchiveBuilder::new().file_with("hello.txt", b"Hello from the patch", Codec::Lz4),
    );

    let config = AssetConfig::new()
        .search_path(tree.path())
        .required_archive("core.arc", ArchivePriority::LOW)
        .archive("patch.arc", ArchivePriority::HIGH);

    let manager = match AssetManager::from_config(&config) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("startup failed: {}", err);
            return;
        }
    };
    manager.register_loader("", TextLoader);
    manager.register_loader("", SettingsLoader);

    if let Some(hello) = manager.load::<String>("hello", AssetScope::Scene, "") {
        println!("{} -> {}", hello.name(), *hello);
    }

    if let Some(video) = manager.load::<Settings>("video", AssetScope::Global, "") {
        for (key, value) in &video.entries {
            println!("video.{} = {}", key, value);
        }
    }

    // The same text requested globally is promoted, not reloaded.
    manager.load::<String>("hello", AssetScope::Global, "");

    println!("scene sweep removed {}", manager.unload_assets(AssetScope::Scene));
    println!("global sweep removed {}", manager.unload_assets(AssetScope::Global));

    for event in manager.drain_events() {
        println!("{:?}", event);
    }
}
