//! Configuration documents for namespace classification and segment sizing.
//!
//! Two JSON documents are consumed:
//!
//! * **namespace definitions** — which object-path keywords and property
//!   names belong to each sensor namespace;
//! * **namespace mapping** — segment size in bytes and the producers
//!   authorized to create each namespace.
//!
//! Both are loaded once per process; the global accessor caches the first
//! successful load and later calls are no-ops.

use crate::consts::{
    segment_stem, NAMESPACE_CFG_ENV, NAMESPACE_CFG_JSON, SHM_MAPPING_ENV, SHM_MAPPING_JSON,
};
use crate::error::{TelemetryError, TelemetryResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Property names published under one object-path keyword pattern.
pub type PropertyList = Vec<String>;

/// One `(object-path keyword pattern, property list)` pair.
pub type NamespaceValue = (String, PropertyList);

/// Namespace name → ordered pattern/property pairs. Patterns may overlap;
/// longer matches win during classification.
pub type NamespaceConfig = HashMap<String, Vec<NamespaceValue>>;

#[derive(Debug, Deserialize)]
struct NamespaceEntry {
    #[serde(rename = "Namespace")]
    namespace: String,
    #[serde(rename = "ObjectpathKeywords")]
    objectpath_keywords: String,
    #[serde(rename = "PropertyList")]
    property_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NamespaceDoc {
    #[serde(rename = "SensorNamespaces")]
    sensor_namespaces: Vec<serde_json::Value>,
}

/// Segment size and authorized producers of one namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct SizeAndProducers {
    /// Segment capacity in bytes.
    #[serde(rename = "SizeInBytes")]
    pub size_in_bytes: u64,
    /// Producer names allowed to create this namespace.
    #[serde(rename = "Producers")]
    pub producers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MappingDoc {
    #[serde(rename = "Namespaces")]
    namespaces: HashMap<String, SizeAndProducers>,
}

/// Parsed view over both config documents.
#[derive(Debug)]
pub struct ShmConfig {
    namespace_config: NamespaceConfig,
    mapping: HashMap<String, SizeAndProducers>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> TelemetryResult<T> {
    if !path.exists() {
        return Err(TelemetryError::InvalidFilePath {
            path: path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| TelemetryError::ConfigParse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| TelemetryError::ConfigParse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

impl ShmConfig {
    /// Load and parse both documents.
    pub fn load(namespace_cfg_path: &Path, mapping_path: &Path) -> TelemetryResult<Self> {
        let namespace_doc: NamespaceDoc = read_json(namespace_cfg_path)?;
        info!(path = %namespace_cfg_path.display(), "namespace config loaded");

        let mut namespace_config: NamespaceConfig = HashMap::new();
        for raw_entry in namespace_doc.sensor_namespaces {
            match serde_json::from_value::<NamespaceEntry>(raw_entry) {
                Ok(entry) => {
                    namespace_config
                        .entry(entry.namespace)
                        .or_default()
                        .push((entry.objectpath_keywords, entry.property_list));
                }
                Err(_) => {
                    // Error in one entry, continue with the remaining ones.
                    warn!("invalid sensor namespace entry skipped");
                }
            }
        }

        let mapping_doc: MappingDoc = read_json(mapping_path)?;
        info!(path = %mapping_path.display(), "shm mapping config loaded");

        Ok(Self {
            namespace_config,
            mapping: mapping_doc.namespaces,
        })
    }

    /// Load from the deployment paths, honoring the environment overrides.
    pub fn load_default() -> TelemetryResult<Self> {
        let namespace_path =
            std::env::var(NAMESPACE_CFG_ENV).unwrap_or_else(|_| NAMESPACE_CFG_JSON.to_string());
        let mapping_path =
            std::env::var(SHM_MAPPING_ENV).unwrap_or_else(|_| SHM_MAPPING_JSON.to_string());
        Self::load(Path::new(&namespace_path), Path::new(&mapping_path))
    }

    /// Namespace name → authorized producers.
    pub fn producers(&self) -> HashMap<String, Vec<String>> {
        self.mapping
            .iter()
            .map(|(namespace, entry)| (namespace.clone(), entry.producers.clone()))
            .collect()
    }

    /// The namespace classification table.
    pub fn namespace_configuration(&self) -> &NamespaceConfig {
        &self.namespace_config
    }

    /// Segment size for `namespace`, verifying that `producer` is
    /// authorized to create it.
    pub fn segment_bytes(&self, namespace: &str, producer: &str) -> TelemetryResult<u64> {
        let entry = self
            .mapping
            .get(namespace)
            .ok_or_else(|| TelemetryError::KeyNotFound {
                key: namespace.to_string(),
            })?;
        if !entry.producers.iter().any(|name| name == producer) {
            return Err(TelemetryError::KeyNotFound {
                key: format!("{namespace}/{producer}"),
            });
        }
        Ok(entry.size_in_bytes)
    }

    /// Consumer directory: segment stem (`<prefix><namespace>_0`) → the
    /// producers publishing into it.
    pub fn consumer_directory(&self) -> HashMap<String, Vec<String>> {
        self.mapping
            .iter()
            .map(|(namespace, entry)| (segment_stem(namespace), entry.producers.clone()))
            .collect()
    }
}

static GLOBAL_CONFIG: OnceLock<ShmConfig> = OnceLock::new();

/// Load the process-wide config from the default paths. The first
/// successful load wins; subsequent calls are no-ops returning the cached
/// instance.
pub fn load_global() -> TelemetryResult<&'static ShmConfig> {
    if let Some(config) = GLOBAL_CONFIG.get() {
        return Ok(config);
    }
    let config = ShmConfig::load_default()?;
    Ok(GLOBAL_CONFIG.get_or_init(|| config))
}

/// The process-wide config, if a load has succeeded.
pub fn global() -> Option<&'static ShmConfig> {
    GLOBAL_CONFIG.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const NAMESPACES_DOC: &str = r#"{
        "SensorNamespaces": [
            {
                "Namespace": "PlatformEnvironmentMetrics",
                "ObjectpathKeywords": "sensors",
                "PropertyList": ["Value"]
            },
            {
                "Namespace": "ProcessorMetrics",
                "ObjectpathKeywords": "inventory/system/processors",
                "PropertyList": ["ceCount", "ueCount"]
            },
            {
                "Namespace": "Broken",
                "ObjectpathKeywords": "oops"
            }
        ]
    }"#;

    const MAPPING_DOC: &str = r#"{
        "Namespaces": {
            "PlatformEnvironmentMetrics": {
                "SizeInBytes": 1024000,
                "Producers": ["gpumgrd", "pldmd", "hwmontemp"]
            },
            "ProcessorMetrics": {
                "SizeInBytes": 2048000,
                "Producers": ["gpumgrd"]
            }
        }
    }"#;

    #[test]
    fn loads_both_documents() {
        let ns = write_file(NAMESPACES_DOC);
        let mapping = write_file(MAPPING_DOC);
        let config = ShmConfig::load(ns.path(), mapping.path()).unwrap();

        let namespace_config = config.namespace_configuration();
        assert_eq!(namespace_config.len(), 2);
        assert_eq!(
            namespace_config["ProcessorMetrics"][0].1,
            vec!["ceCount".to_string(), "ueCount".to_string()]
        );
        // The entry missing PropertyList is skipped, not fatal.
        assert!(!namespace_config.contains_key("Broken"));
    }

    #[test]
    fn missing_file_is_invalid_file_path() {
        let mapping = write_file(MAPPING_DOC);
        let result = ShmConfig::load(Path::new("/nonexistent/ns.json"), mapping.path());
        assert!(matches!(result, Err(TelemetryError::InvalidFilePath { .. })));
    }

    #[test]
    fn malformed_json_is_config_parse() {
        let ns = write_file("not json {{{");
        let mapping = write_file(MAPPING_DOC);
        let result = ShmConfig::load(ns.path(), mapping.path());
        assert!(matches!(result, Err(TelemetryError::ConfigParse { .. })));
    }

    #[test]
    fn missing_top_level_key_is_config_parse() {
        let ns = write_file(NAMESPACES_DOC);
        let mapping = write_file(r#"{"NotNamespaces": {}}"#);
        let result = ShmConfig::load(ns.path(), mapping.path());
        assert!(matches!(result, Err(TelemetryError::ConfigParse { .. })));
    }

    #[test]
    fn producers_and_directory() {
        let ns = write_file(NAMESPACES_DOC);
        let mapping = write_file(MAPPING_DOC);
        let config = ShmConfig::load(ns.path(), mapping.path()).unwrap();

        let producers = config.producers();
        assert_eq!(
            producers["PlatformEnvironmentMetrics"],
            vec!["gpumgrd", "pldmd", "hwmontemp"]
        );

        let directory = config.consumer_directory();
        assert_eq!(
            directory["HGX_PlatformEnvironmentMetrics_0"],
            vec!["gpumgrd", "pldmd", "hwmontemp"]
        );
        assert_eq!(directory["HGX_ProcessorMetrics_0"], vec!["gpumgrd"]);
    }

    #[test]
    fn segment_bytes_checks_membership() {
        let ns = write_file(NAMESPACES_DOC);
        let mapping = write_file(MAPPING_DOC);
        let config = ShmConfig::load(ns.path(), mapping.path()).unwrap();

        assert_eq!(
            config.segment_bytes("ProcessorMetrics", "gpumgrd").unwrap(),
            2_048_000
        );
        assert!(matches!(
            config.segment_bytes("ProcessorMetrics", "pldmd"),
            Err(TelemetryError::KeyNotFound { .. })
        ));
        assert!(matches!(
            config.segment_bytes("NoSuchNamespace", "gpumgrd"),
            Err(TelemetryError::KeyNotFound { .. })
        ));
    }
}
