use std::path::Path;

use anyhow::Context;
use postbox_core::RawEvent;
use postbox_memory_backend::MemorySeed;
use serde::Deserialize;

/// A scripted run: what the store holds, then the events the engine emits.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(flatten)]
    pub seed: MemorySeed,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse scenario {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
