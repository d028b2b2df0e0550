//! Device tree generation from a recovery image.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Build properties read from the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BuildProperties(HashMap<String, String>);

impl BuildProperties {
    /// Creates an empty property bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value of the first key that is present.
    #[must_use]
    pub fn first_of<K: AsRef<str>>(&self, keys: &[K]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key.as_ref()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BuildProperties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A generated device tree on disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedTree {
    /// Directory holding the tree; a git repository when requested.
    pub path: PathBuf,
    /// Device manufacturer, e.g. `xiaomi`.
    pub manufacturer: String,
    /// Device codename, e.g. `lavender`.
    pub codename: String,
    /// Build properties read from the image.
    #[serde(default)]
    pub properties: BuildProperties,
    /// Properties that may hold the build description, in lookup order.
    /// The generator derives them from its partition list.
    #[serde(default)]
    pub description_keys: Vec<String>,
}

impl GeneratedTree {
    /// Returns the build description of the first partition carrying one.
    #[must_use]
    pub fn build_description(&self) -> Option<&str> {
        self.properties.first_of(&self.description_keys)
    }
}

/// Errors raised by the generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The generator process could not be started.
    #[error("failed to start generator: {0}")]
    Spawn(#[source] std::io::Error),

    /// The generator ran and reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The generator output could not be parsed.
    #[error("invalid generator output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// Turns a recovery image into a device tree.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTreeGenerator: Send + Sync {
    /// Generates a tree for `image` inside `output`, initialising a git
    /// repository with one commit when `git` is set.
    async fn generate(
        &self,
        image: &Path,
        output: &Path,
        git: bool,
    ) -> Result<GeneratedTree, GeneratorError>;
}

const BRIDGE_SCRIPT: &str = r#"
import json
import sys
from pathlib import Path

try:
    from twrpdtgen.device_tree import DeviceTree
    from twrpdtgen.utils.device_info import PARTITIONS

    image, output, git = sys.argv[1], sys.argv[2], sys.argv[3] == "1"
    keys = ["ro.build.description"] + [
        f"ro.{partition}.build.description" for partition in PARTITIONS
    ]
    tree = DeviceTree(Path(image))
    folder = tree.dump_to_folder(Path(output), git=git)
    info = tree.device_info
    properties = {}
    for key in keys:
        value = info.get_prop(key, raise_exception=False)
        if value is not None:
            properties[key] = value
    json.dump({
        "path": str(folder),
        "manufacturer": info.manufacturer,
        "codename": info.codename,
        "properties": properties,
        "description_keys": keys,
    }, sys.stdout)
except Exception as e:
    sys.stderr.write(str(e))
    sys.exit(1)
"#;

/// Runs the `twrpdtgen` Python library in a child interpreter.
#[derive(Debug, Clone)]
pub struct PythonTwrpdtgen {
    interpreter: PathBuf,
}

impl Default for PythonTwrpdtgen {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonTwrpdtgen {
    /// Uses `python3` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_interpreter("python3")
    }

    /// Uses a specific Python interpreter.
    #[must_use]
    pub fn with_interpreter(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    fn failure_message(stderr: &[u8], status: std::process::ExitStatus) -> String {
        let stderr = String::from_utf8_lossy(stderr);
        stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map_or_else(|| format!("generator exited with {status}"), str::to_string)
    }
}

#[async_trait]
impl DeviceTreeGenerator for PythonTwrpdtgen {
    async fn generate(
        &self,
        image: &Path,
        output: &Path,
        git: bool,
    ) -> Result<GeneratedTree, GeneratorError> {
        let result = Command::new(&self.interpreter)
            .arg("-c")
            .arg(BRIDGE_SCRIPT)
            .arg(image)
            .arg(output)
            .arg(if git { "1" } else { "0" })
            .kill_on_drop(true)
            .output()
            .await
            .map_err(GeneratorError::Spawn)?;

        if !result.status.success() {
            return Err(GeneratorError::Failed(Self::failure_message(
                &result.stderr,
                result.status,
            )));
        }

        let tree: GeneratedTree = serde_json::from_slice(&result.stdout)?;
        debug!(
            path = %tree.path.display(),
            manufacturer = %tree.manufacturer,
            codename = %tree.codename,
            "Device tree generated"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEYS: [&str; 3] = [
        "ro.build.description",
        "ro.system.build.description",
        "ro.vendor.build.description",
    ];

    #[test]
    fn test_first_of_follows_key_order() {
        let props: BuildProperties = [
            ("ro.vendor.build.description", "vendor-desc"),
            ("ro.system.build.description", "system-desc"),
        ]
        .into_iter()
        .collect();

        assert_eq!(props.first_of(&KEYS), Some("system-desc"));
        assert_eq!(
            props.first_of(&["ro.vendor.build.description", "ro.system.build.description"]),
            Some("vendor-desc")
        );
        assert_eq!(props.first_of(&["ro.product.name"]), None);
    }

    #[test]
    fn test_tree_parses_bridge_output() {
        let json = r#"{
            "path": "/tmp/working/xiaomi/lavender",
            "manufacturer": "xiaomi",
            "codename": "lavender",
            "properties": {
                "ro.vendor.build.description": "vendor-desc",
                "ro.build.description": "lavender-user 10 QKQ1 V12 release-keys"
            },
            "description_keys": ["ro.build.description", "ro.vendor.build.description"]
        }"#;

        let tree: GeneratedTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.codename, "lavender");
        assert_eq!(tree.build_description(), Some("lavender-user 10 QKQ1 V12 release-keys"));
    }

    #[test]
    fn test_description_needs_lookup_keys() {
        let json = r#"{
            "path": "/tmp/working/xiaomi/lavender",
            "manufacturer": "xiaomi",
            "codename": "lavender",
            "properties": {"ro.build.description": "generic"}
        }"#;

        let tree: GeneratedTree = serde_json::from_str(json).unwrap();
        assert!(tree.description_keys.is_empty());
        assert_eq!(tree.build_description(), None);
    }

    #[test]
    fn test_bridge_builds_keys_from_partition_list() {
        assert!(BRIDGE_SCRIPT.contains("from twrpdtgen.utils.device_info import PARTITIONS"));
        assert!(BRIDGE_SCRIPT.contains("\"description_keys\": keys"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let generator = PythonTwrpdtgen::with_interpreter("/nonexistent/python3");

        let result = generator
            .generate(&dir.path().join("recovery.img"), &dir.path().join("working"), true)
            .await;

        assert!(matches!(result, Err(GeneratorError::Spawn(_))));
    }

    #[test]
    fn test_failure_message_uses_last_stderr_line() {
        let status = std::process::Command::new("false").status().unwrap();
        let stderr = b"Traceback\n  ...\nImage is not a recovery\n\n";
        let message = PythonTwrpdtgen::failure_message(stderr, status);
        assert_eq!(message, "Image is not a recovery");

        let message = PythonTwrpdtgen::failure_message(b"", status);
        assert!(message.starts_with("generator exited with"));
    }
}
