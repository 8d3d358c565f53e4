//! Configuration types deserialized from `livepatch.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Default descriptor of the class annotation carrying group metadata.
pub const DEFAULT_KEY_META_CLASS: &str = "Landroidx/compose/runtime/internal/FunctionKeyMetaClass;";

/// Default descriptor of the per-method group annotation.
pub const DEFAULT_KEY_META_METHOD: &str = "Landroidx/compose/runtime/internal/FunctionKeyMeta;";

/// The top-level configuration parsed from `livepatch.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LivePatchConfig {
    /// Live session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Pass scheduling settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Extra inputs for class classification.
    #[serde(default)]
    pub classify: ClassifyConfig,
    /// Invalidation group metadata settings.
    #[serde(default)]
    pub groups: GroupsConfig,
}

/// Settings for one live session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory holding the class files of the deployed build.
    #[serde(default = "default_baseline_dir")]
    pub baseline_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baseline_dir: default_baseline_dir(),
        }
    }
}

fn default_baseline_dir() -> PathBuf {
    PathBuf::from("build/baseline")
}

/// How passes are invoked.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Wait for a quiet period, then run with write priority and retry on cancellation.
    #[default]
    Automatic,
    /// Run a plain blocking pass without preemption.
    Manual,
}

/// Pass scheduling settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// The default invocation policy.
    #[serde(default)]
    pub policy: PolicyKind,
    /// How long sources must stay unmodified before an automatic pass starts.
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// How many times a cancelled automatic pass is retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How often the quiet period is re-checked.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            quiet_period_ms: default_quiet_period_ms(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// The quiet period as a [`Duration`].
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_quiet_period_ms() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    8
}

fn default_poll_interval_ms() -> u64 {
    20
}

/// Extra classification inputs, added to the built-in tables.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ClassifyConfig {
    /// Internal names of additional synthetic lambda base classes.
    ///
    /// Accepts a single string or a list.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub lambda_supertypes: Vec<String>,
    /// Descriptors of additional method annotations marking inline functions.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub inline_markers: Vec<String>,
}

/// Invalidation group metadata settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GroupsConfig {
    /// Descriptor of the class annotation listing group keys and offsets.
    #[serde(default = "default_key_meta_annotation")]
    pub key_meta_annotation: String,
    /// Descriptor of the per-method group annotation.
    #[serde(default = "default_method_key_annotation")]
    pub method_key_annotation: String,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            key_meta_annotation: default_key_meta_annotation(),
            method_key_annotation: default_method_key_annotation(),
        }
    }
}

fn default_key_meta_annotation() -> String {
    DEFAULT_KEY_META_CLASS.to_string()
}

fn default_method_key_annotation() -> String {
    DEFAULT_KEY_META_METHOD.to_string()
}

/// Accepts `key = "a"` as well as `key = ["a", "b"]`.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                out.push(val);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_durations() {
        let s = SchedulerConfig::default();
        assert_eq!(s.quiet_period(), Duration::from_millis(300));
        assert_eq!(s.poll_interval(), Duration::from_millis(20));
        assert_eq!(s.max_retries, 8);
    }

    #[test]
    fn policy_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: PolicyKind,
        }
        let w: Wrapper = toml::from_str("policy = \"manual\"").unwrap();
        assert_eq!(w.policy, PolicyKind::Manual);
        assert!(toml::from_str::<Wrapper>("policy = \"eager\"").is_err());
    }

    #[test]
    fn string_or_list() {
        let single: ClassifyConfig = toml::from_str("lambda_supertypes = \"a/B\"").unwrap();
        assert_eq!(single.lambda_supertypes, vec!["a/B"]);
        let list: ClassifyConfig =
            toml::from_str("inline_markers = [\"La/X;\", \"La/Y;\"]").unwrap();
        assert_eq!(list.inline_markers.len(), 2);
    }
}
