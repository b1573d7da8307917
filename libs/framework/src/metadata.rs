//! Charm metadata model.
//!
//! Parses `metadata.yaml` and `actions.yaml` into typed descriptors. The
//! descriptors drive which event sources exist for a charm.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// Errors from parsing charm metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid {document}: {source}")]
    Yaml {
        document: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("storage {storage}: invalid multiple range {range:?}")]
    InvalidRange { storage: String, range: String },

    #[error("relation name {0} is declared more than once across requires, provides and peers")]
    DuplicateRelation(String),
}

/// Role of a relation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationRole {
    Requires,
    Provides,
    Peer,
}

impl RelationRole {
    pub fn is_peer(&self) -> bool {
        matches!(self, RelationRole::Peer)
    }
}

/// Relation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationScope {
    #[default]
    Global,
    Container,
}

/// A declared relation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMeta {
    pub role: RelationRole,
    pub relation_name: String,
    pub interface_name: String,
    pub scope: RelationScope,
    pub limit: Option<u32>,
    pub optional: bool,
}

/// Storage multiplicity. `max` is `None` for an open upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplicity {
    pub min: u32,
    pub max: Option<u32>,
}

impl Multiplicity {
    /// Parses `N` (exactly N), `N-` (at least N) or `N-M` (inclusive range).
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim();
        match range.split_once('-') {
            None => {
                let n = range.parse().ok()?;
                Some(Self {
                    min: n,
                    max: Some(n),
                })
            }
            Some((min, "")) => Some(Self {
                min: min.trim().parse().ok()?,
                max: None,
            }),
            Some((min, max)) => {
                let min: u32 = min.trim().parse().ok()?;
                let max: u32 = max.trim().parse().ok()?;
                (max >= min).then_some(Self {
                    min,
                    max: Some(max),
                })
            }
        }
    }

    pub fn contains(&self, count: u32) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

/// A declared storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMeta {
    pub storage_name: String,
    pub storage_type: String,
    pub description: String,
    pub shared: bool,
    pub read_only: bool,
    pub minimum_size: Option<String>,
    pub location: Option<String>,
    pub multiple: Option<Multiplicity>,
    pub properties: Vec<String>,
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMeta {
    pub resource_name: String,
    pub resource_type: String,
    pub filename: Option<String>,
    pub description: String,
}

/// A declared payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMeta {
    pub payload_name: String,
    pub payload_type: String,
}

/// A declared action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMeta {
    pub name: String,
    pub title: String,
    pub description: String,
    /// Parameter name to JSON-Schema definition.
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub required: Vec<String>,
}

/// Immutable charm metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CharmMeta {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub maintainers: Vec<String>,
    pub tags: Vec<String>,
    pub terms: Vec<String>,
    pub series: Vec<String>,
    pub subordinate: bool,
    pub min_juju_version: Option<String>,
    pub requires: BTreeMap<String, RelationMeta>,
    pub provides: BTreeMap<String, RelationMeta>,
    pub peers: BTreeMap<String, RelationMeta>,
    /// Combined view of requires, provides and peers.
    pub relations: BTreeMap<String, RelationMeta>,
    pub storages: BTreeMap<String, StorageMeta>,
    pub resources: BTreeMap<String, ResourceMeta>,
    pub payloads: BTreeMap<String, PayloadMeta>,
    pub extra_bindings: Vec<String>,
    pub actions: BTreeMap<String, ActionMeta>,
}

impl CharmMeta {
    /// Parses metadata and optional action definitions.
    pub fn from_yaml(metadata: &str, actions: Option<&str>) -> Result<Self, MetadataError> {
        let raw: RawMeta = parse_document("metadata.yaml", metadata)?;
        let raw_actions: BTreeMap<String, Option<RawAction>> = match actions {
            Some(actions) => parse_document("actions.yaml", actions)?,
            None => BTreeMap::new(),
        };

        let mut maintainers: Vec<String> = raw.maintainer.into_iter().collect();
        maintainers.extend(raw.maintainers);

        let requires = relation_metas(RelationRole::Requires, raw.requires);
        let provides = relation_metas(RelationRole::Provides, raw.provides);
        let peers = relation_metas(RelationRole::Peer, raw.peers);

        let mut relations = BTreeMap::new();
        for (name, rel) in requires.iter().chain(&provides).chain(&peers) {
            if relations.insert(name.clone(), rel.clone()).is_some() {
                return Err(MetadataError::DuplicateRelation(name.clone()));
            }
        }

        let storages = raw
            .storage
            .into_iter()
            .map(|(name, storage)| {
                let multiple = storage
                    .multiple
                    .map(|m| {
                        let range = m.range.to_string();
                        Multiplicity::parse(&range).ok_or_else(|| MetadataError::InvalidRange {
                            storage: name.clone(),
                            range,
                        })
                    })
                    .transpose()?;
                let meta = StorageMeta {
                    storage_name: name.clone(),
                    storage_type: storage.storage_type,
                    description: storage.description,
                    shared: storage.shared,
                    read_only: storage.read_only,
                    minimum_size: storage.minimum_size,
                    location: storage.location,
                    multiple,
                    properties: storage.properties,
                };
                Ok((name, meta))
            })
            .collect::<Result<BTreeMap<_, _>, MetadataError>>()?;

        let resources = raw
            .resources
            .into_iter()
            .map(|(name, res)| {
                let meta = ResourceMeta {
                    resource_name: name.clone(),
                    resource_type: res.resource_type,
                    filename: res.filename,
                    description: res.description,
                };
                (name, meta)
            })
            .collect();

        let payloads = raw
            .payloads
            .into_iter()
            .map(|(name, payload)| {
                let meta = PayloadMeta {
                    payload_name: name.clone(),
                    payload_type: payload.payload_type,
                };
                (name, meta)
            })
            .collect();

        let actions = raw_actions
            .into_iter()
            .map(|(name, action)| {
                let action = action.unwrap_or_default();
                let meta = ActionMeta {
                    name: name.clone(),
                    title: action.title,
                    description: action.description,
                    parameters: action.params,
                    required: action.required,
                };
                (name, meta)
            })
            .collect();

        Ok(Self {
            name: raw.name,
            summary: raw.summary,
            description: raw.description,
            maintainers,
            tags: raw.tags,
            terms: raw.terms,
            series: raw.series,
            subordinate: raw.subordinate,
            min_juju_version: raw.min_juju_version,
            requires,
            provides,
            peers,
            relations,
            storages,
            resources,
            payloads,
            extra_bindings: raw.extra_bindings.into_keys().collect(),
            actions,
        })
    }
}

fn parse_document<T>(document: &'static str, text: &str) -> Result<T, MetadataError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    let value: Option<T> =
        serde_yaml::from_str(text).map_err(|source| MetadataError::Yaml { document, source })?;
    Ok(value.unwrap_or_default())
}

fn relation_metas(
    role: RelationRole,
    raw: BTreeMap<String, RawRelation>,
) -> BTreeMap<String, RelationMeta> {
    raw.into_iter()
        .map(|(name, rel)| {
            let meta = RelationMeta {
                role,
                relation_name: name.clone(),
                interface_name: rel.interface,
                scope: rel.scope,
                limit: rel.limit,
                optional: rel.optional,
            };
            (name, meta)
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    maintainer: Option<String>,
    #[serde(default)]
    maintainers: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    terms: Vec<String>,
    #[serde(default)]
    series: Vec<String>,
    #[serde(default)]
    subordinate: bool,
    min_juju_version: Option<String>,
    #[serde(default)]
    requires: BTreeMap<String, RawRelation>,
    #[serde(default)]
    provides: BTreeMap<String, RawRelation>,
    #[serde(default)]
    peers: BTreeMap<String, RawRelation>,
    #[serde(default)]
    storage: BTreeMap<String, RawStorage>,
    #[serde(default)]
    resources: BTreeMap<String, RawResource>,
    #[serde(default)]
    payloads: BTreeMap<String, RawPayload>,
    #[serde(default)]
    extra_bindings: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    interface: String,
    #[serde(default)]
    scope: RelationScope,
    limit: Option<u32>,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawStorage {
    #[serde(rename = "type")]
    storage_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    shared: bool,
    #[serde(default)]
    read_only: bool,
    minimum_size: Option<String>,
    location: Option<String>,
    multiple: Option<RawMultiple>,
    #[serde(default)]
    properties: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMultiple {
    range: RawRange,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRange {
    Count(u32),
    Text(String),
}

impl std::fmt::Display for RawRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawRange::Count(n) => write!(f, "{n}"),
            RawRange::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    filename: Option<String>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(rename = "type")]
    payload_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAction {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    required: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const METADATA: &str = r#"
name: alertmanager
summary: Prometheus Alertmanager
maintainers:
  - Ops Team <ops@example.com>
series:
  - kubernetes
provides:
  prometheus:
    interface: prometheus-alerting
peers:
  alertmanager-cluster:
    interface: alertmanager-peers
storage:
  data:
    type: filesystem
    location: /alertmanager
    multiple:
      range: 1-
resources:
  alertmanager-image:
    type: oci-image
    description: upstream image
extra-bindings:
  metrics:
"#;

    #[test]
    fn test_parse_metadata() {
        let meta = CharmMeta::from_yaml(METADATA, None).unwrap();

        assert_eq!(meta.name, "alertmanager");
        assert_eq!(meta.maintainers.len(), 1);
        assert_eq!(meta.relations.len(), 2);
        assert_eq!(
            meta.relations["prometheus"].interface_name,
            "prometheus-alerting"
        );
        assert_eq!(meta.relations["prometheus"].role, RelationRole::Provides);
        assert!(meta.peers["alertmanager-cluster"].role.is_peer());
        assert_eq!(meta.relations["prometheus"].scope, RelationScope::Global);

        let data = &meta.storages["data"];
        assert!(!data.shared);
        assert!(!data.read_only);
        assert_eq!(data.description, "");
        assert_eq!(data.multiple, Some(Multiplicity { min: 1, max: None }));

        assert_eq!(meta.resources["alertmanager-image"].resource_type, "oci-image");
        assert_eq!(meta.extra_bindings, vec!["metrics".to_string()]);
        assert!(meta.actions.is_empty());
    }

    #[test]
    fn test_parse_actions() {
        let actions = r#"
backup-now:
  description: Take a snapshot
  params:
    target:
      type: string
  required: [target]
reload:
"#;
        let meta = CharmMeta::from_yaml("name: am", Some(actions)).unwrap();
        let backup = &meta.actions["backup-now"];
        assert_eq!(backup.required, vec!["target".to_string()]);
        assert_eq!(backup.parameters["target"]["type"], "string");
        assert_eq!(meta.actions["reload"].title, "");
    }

    #[test]
    fn test_missing_interface_is_an_error() {
        let err = CharmMeta::from_yaml("requires:\n  db:\n    scope: container\n", None)
            .unwrap_err();
        assert!(err.to_string().contains("interface"), "{err}");
    }

    #[test]
    fn test_missing_storage_type_is_an_error() {
        let err = CharmMeta::from_yaml("storage:\n  data:\n    location: /srv\n", None)
            .unwrap_err();
        assert!(err.to_string().contains("type"), "{err}");
    }

    #[test]
    fn test_missing_resource_type_is_an_error() {
        let yaml = "resources:\n  alertmanager-image:\n    description: OCI image\n";
        let err = CharmMeta::from_yaml(yaml, None).unwrap_err();
        assert!(matches!(err, MetadataError::Yaml { document: "metadata.yaml", .. }), "{err}");
        assert!(err.to_string().contains("type"), "{err}");
    }

    #[test]
    fn test_duplicate_relation_names_rejected() {
        let yaml = "requires:\n  db:\n    interface: pg\npeers:\n  db:\n    interface: pg\n";
        assert!(matches!(
            CharmMeta::from_yaml(yaml, None),
            Err(MetadataError::DuplicateRelation(name)) if name == "db"
        ));
    }

    #[rstest]
    #[case("3", Some((3, Some(3))))]
    #[case("2-", Some((2, None)))]
    #[case("1-4", Some((1, Some(4))))]
    #[case("4-1", None)]
    #[case("x", None)]
    #[case("-3", None)]
    fn test_multiplicity_parse(#[case] range: &str, #[case] expected: Option<(u32, Option<u32>)>) {
        let parsed = Multiplicity::parse(range).map(|m| (m.min, m.max));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_numeric_range() {
        let yaml = "storage:\n  data:\n    type: block\n    multiple:\n      range: 2\n";
        let meta = CharmMeta::from_yaml(yaml, None).unwrap();
        let multiple = meta.storages["data"].multiple.unwrap();
        assert!(multiple.contains(2));
        assert!(!multiple.contains(3));
    }

    #[test]
    fn test_empty_documents() {
        let meta = CharmMeta::from_yaml("", Some("")).unwrap();
        assert_eq!(meta, CharmMeta::default());
    }
}
