use crate::remote::Channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Key used to look up the session-level prefix.
pub const SESSION_KEY: &str = "session";

/// Bounded fixed-interval polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    pub attempts: u32,
    #[serde(with = "millis")]
    pub interval: Duration,
}

impl WaitPolicy {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// 30 attempts, one second apart.
    pub const fn collection() -> Self {
        Self::new(30, Duration::from_secs(1))
    }

    /// Two hours worth of one-second polls.
    pub const fn package() -> Self {
        Self::new(120 * 60, Duration::from_secs(1))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Name prefix per top-level folder kind, plus [`SESSION_KEY`].
    /// Unknown kinds get no prefix.
    pub prefixes: BTreeMap<String, String>,
    /// Package names that are never renamed.
    pub protected_names: Vec<String>,
    /// Append the source extensions the remote may strip from names.
    pub add_extension: bool,
    pub channel: Channel,
    pub collection_wait: WaitPolicy,
    pub package_wait: WaitPolicy,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let prefixes = [
            ("primary", "sub-"),
            ("derivative", "sub-"),
            ("samples", "sam-"),
            (SESSION_KEY, "ses-"),
            ("performance", "perf-"),
            ("pool", "pool-"),
            ("source", "sub-"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let protected_names = [
            "subjects.csv",
            "samples.csv",
            "dataset_description.csv",
            "submission.csv",
            "Readme",
            "Changes",
            "manifest.csv",
            "manifest.xls",
            "manifest.xlsx",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        Self {
            prefixes,
            protected_names,
            add_extension: true,
            channel: Channel::Api,
            collection_wait: WaitPolicy::collection(),
            package_wait: WaitPolicy::package(),
        }
    }
}

impl UploadConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let f = std::fs::File::open(path).with_context(|| format!("open config {:?}", path))?;
        serde_json::from_reader(f).with_context(|| format!("parse config {:?}", path))
    }

    pub fn prefix_for(&self, kind: &str) -> &str {
        self.prefixes.get(kind).map_or("", String::as_str)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_names.iter().any(|p| p == name)
    }

    /// Zero-interval waits, for tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.collection_wait.interval = Duration::ZERO;
        self.package_wait.interval = Duration::ZERO;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
