//! The alerting section Prometheus needs to discover this Alertmanager.
//!
//! See the `alerting` section of
//! <https://prometheus.io/docs/prometheus/latest/configuration/configuration/>.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrometheusAlertingConfig {
    alertmanagers: Vec<AlertmanagerTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct AlertmanagerTarget {
    kubernetes_sd_configs: Vec<KubernetesSdConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct KubernetesSdConfig {
    role: &'static str,
    namespaces: Namespaces,
    selectors: Vec<Selector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Namespaces {
    names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Selector {
    role: &'static str,
    label: String,
}

impl PrometheusAlertingConfig {
    /// Pod discovery of Alertmanager in `namespace`, filtered by `label_selector`.
    pub fn new(namespace: impl Into<String>, label_selector: impl Into<String>) -> Self {
        Self {
            alertmanagers: vec![AlertmanagerTarget {
                kubernetes_sd_configs: vec![KubernetesSdConfig {
                    role: "pod",
                    namespaces: Namespaces {
                        names: vec![namespace.into()],
                    },
                    selectors: vec![Selector {
                        role: "pod",
                        label: label_selector.into(),
                    }],
                }],
            }],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
