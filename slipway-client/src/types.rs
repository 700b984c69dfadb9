//! Cluster object models
//!
//! Only the fields the build engine reads or writes are modelled. Everything
//! serializes to the API server's camelCase JSON.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Object metadata shared by every resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Server-side name generation prefix, used when `name` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Secrets and config maps
// =============================================================================

/// Opaque secret. Values in `data` are base64 encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Creates a secret holding a single key
    pub fn new(metadata: ObjectMeta, key: impl Into<String>, value: &[u8]) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key.into(), STANDARD.encode(value));
        Self {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
            metadata,
            data,
        }
    }

    /// Decodes the value stored under `key`
    pub fn decoded(&self, key: &str) -> Option<Vec<u8>> {
        self.data.get(key).and_then(|v| STANDARD.decode(v).ok())
    }
}

/// Config map carrying binary payloads (base64 encoded on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub binary_data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Creates a config map holding a single binary key
    pub fn binary(metadata: ObjectMeta, key: impl Into<String>, value: &[u8]) -> Self {
        let mut binary_data = BTreeMap::new();
        binary_data.insert(key.into(), STANDARD.encode(value));
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata,
            binary_data,
        }
    }
}

// =============================================================================
// Pods
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

impl Pod {
    pub fn new(metadata: ObjectMeta, spec: PodSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            metadata,
            spec,
            status: None,
        }
    }

    /// Server-assigned (or requested) name
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// Current phase, `Unknown` when the server has not reported one yet
    pub fn phase(&self) -> PodPhase {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::from)
            .unwrap_or(PodPhase::Unknown)
    }

    /// First termination message or reason reported by any container
    pub fn termination_message(&self) -> Option<String> {
        self.status
            .as_ref()?
            .container_statuses
            .iter()
            .filter_map(|cs| cs.state.as_ref()?.terminated.as_ref())
            .find_map(|t| {
                t.message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .or_else(|| t.reason.clone())
                    .map(|m| format!("{} (exit code {})", m.trim(), t.exit_code))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolumeSource {
    pub secret_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapVolumeSource {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub state: Option<ContainerState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default)]
    pub terminated: Option<ContainerStateTerminated>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStateTerminated {
    pub exit_code: i32,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Lifecycle phase of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Whether the pod will not change phase anymore
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_encodes_data() {
        let secret = Secret::new(ObjectMeta::named("kaniko-secret"), "kaniko-secret", b"{}");
        assert_eq!(secret.data.get("kaniko-secret"), Some(&"e30=".to_string()));
        assert_eq!(secret.decoded("kaniko-secret"), Some(b"{}".to_vec()));

        let json = serde_json::to_value(&secret).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "Secret");
        assert_eq!(json["metadata"]["name"], "kaniko-secret");
    }

    #[test]
    fn test_pod_serializes_camel_case() {
        let pod = Pod::new(
            ObjectMeta {
                generate_name: Some("kaniko-".to_string()),
                ..Default::default()
            },
            PodSpec {
                containers: vec![Container {
                    name: "kaniko".to_string(),
                    image: "executor".to_string(),
                    volume_mounts: vec![VolumeMount {
                        name: "secret".to_string(),
                        mount_path: "/secret".to_string(),
                    }],
                    ..Default::default()
                }],
                restart_policy: Some("Never".to_string()),
                volumes: vec![],
            },
        );

        let json = serde_json::to_value(&pod).unwrap();
        assert_eq!(json["metadata"]["generateName"], "kaniko-");
        assert!(json["metadata"].get("name").is_none());
        assert_eq!(json["spec"]["restartPolicy"], "Never");
        assert_eq!(
            json["spec"]["containers"][0]["volumeMounts"][0]["mountPath"],
            "/secret"
        );
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_pod_phase_and_termination_message() {
        let json = r#"{
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "kaniko-x1"},
            "spec": {"containers": [{"name": "kaniko", "image": "executor"}]},
            "status": {
                "phase": "Failed",
                "containerStatuses": [{
                    "name": "kaniko",
                    "state": {"terminated": {"exitCode": 1, "reason": "Error", "message": "no such file"}}
                }]
            }
        }"#;

        let pod: Pod = serde_json::from_str(json).unwrap();
        assert_eq!(pod.name(), Some("kaniko-x1"));
        assert_eq!(pod.phase(), PodPhase::Failed);
        assert!(pod.phase().is_terminal());
        assert_eq!(
            pod.termination_message(),
            Some("no such file (exit code 1)".to_string())
        );
    }

    #[test]
    fn test_pod_phase_defaults_to_unknown() {
        let pod = Pod::new(ObjectMeta::named("p"), PodSpec::default());
        assert_eq!(pod.phase(), PodPhase::Unknown);
        assert!(!pod.phase().is_terminal());
        assert_eq!(PodPhase::from("Running"), PodPhase::Running);
    }
}
