//! Service account permissions of the control plane components.

use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};

use super::strings;

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const HYPERSHIFT_GROUP: &str = "hypershift.openshift.io";

const CAPI_GROUPS: [&str; 8] = [
    "bootstrap.cluster.x-k8s.io",
    "controlplane.cluster.x-k8s.io",
    "infrastructure.cluster.x-k8s.io",
    "machines.cluster.x-k8s.io",
    "exp.infrastructure.cluster.x-k8s.io",
    "addons.cluster.x-k8s.io",
    "exp.cluster.x-k8s.io",
    "cluster.x-k8s.io",
];

/// Components deployed into each control plane namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Cluster API manager
    ClusterApiManager,
    /// Cluster API AWS provider
    CapiAwsProvider,
    /// Cluster autoscaler
    Autoscaler,
    /// Control plane operator
    ControlPlaneOperator,
    /// Ignition server
    IgnitionServer,
}

impl Component {
    /// Name of the service account, role and role binding
    pub fn name(self) -> &'static str {
        match self {
            Component::ClusterApiManager => "cluster-api",
            Component::CapiAwsProvider => "capi-provider",
            Component::Autoscaler => "cluster-autoscaler",
            Component::ControlPlaneOperator => "control-plane-operator",
            Component::IgnitionServer => "ignition-server",
        }
    }

    /// Name of the component's deployment
    pub fn deployment_name(self) -> &'static str {
        match self {
            Component::CapiAwsProvider => "capa-controller-manager",
            other => other.name(),
        }
    }

    /// Cluster role name; `None` when the component only needs namespaced access
    ///
    /// The control plane operator's role is identical for every cluster and
    /// shared; the Cluster API manager gets one per control plane namespace.
    pub fn cluster_role_name(self, namespace: &str) -> Option<String> {
        match self {
            Component::ClusterApiManager => Some(format!("cluster-api-{namespace}")),
            Component::ControlPlaneOperator => Some("hypershift-control-plane-operator".to_string()),
            _ => None,
        }
    }

    /// Cluster role binding name for this control plane namespace
    pub fn cluster_role_binding_name(self, namespace: &str) -> Option<String> {
        match self {
            Component::ClusterApiManager => Some(format!("cluster-api-{namespace}")),
            Component::ControlPlaneOperator => {
                Some(format!("hypershift-control-plane-operator-{namespace}"))
            }
            _ => None,
        }
    }

    /// True when the cluster role is shared between clusters
    pub fn shares_cluster_role(self) -> bool {
        self == Component::ControlPlaneOperator
    }

    fn role_rules(self) -> Vec<PolicyRule> {
        let all = ["*"];
        match self {
            Component::ClusterApiManager => vec![
                rule(&CAPI_GROUPS, &all, &all),
                rule(
                    &[HYPERSHIFT_GROUP],
                    &["hostedcontrolplanes", "hostedcontrolplanes/status"],
                    &all,
                ),
                rule(&[""], &["configmaps", "events", "nodes", "secrets"], &all),
            ],
            Component::CapiAwsProvider => vec![
                rule(&[""], &["events", "secrets"], &all),
                rule(&CAPI_GROUPS, &all, &all),
                rule(&[HYPERSHIFT_GROUP], &all, &all),
            ],
            Component::Autoscaler => vec![
                rule(
                    &["apiextensions.k8s.io"],
                    &["customresourcedefinitions"],
                    &["get", "list", "watch"],
                ),
                rule(
                    &["cluster.x-k8s.io"],
                    &[
                        "machinedeployments",
                        "machinedeployments/scale",
                        "machines",
                        "machinesets",
                        "machinesets/scale",
                    ],
                    &all,
                ),
            ],
            Component::ControlPlaneOperator => vec![
                rule(&[HYPERSHIFT_GROUP], &all, &all),
                rule(&CAPI_GROUPS, &all, &all),
                rule(&["route.openshift.io"], &all, &all),
                rule(
                    &[""],
                    &[
                        "events",
                        "configmaps",
                        "pods",
                        "pods/log",
                        "secrets",
                        "nodes",
                        "serviceaccounts",
                        "services",
                    ],
                    &all,
                ),
                rule(&["apps"], &["deployments"], &all),
                rule(&["etcd.database.coreos.com"], &all, &all),
                rule(&["machine.openshift.io"], &all, &all),
                rule(&["image.openshift.io"], &["imagestreams"], &all),
            ],
            Component::IgnitionServer => vec![
                rule(
                    &[""],
                    &["events", "secrets", "pods/log", "serviceaccounts", "pods", "configmaps"],
                    &all,
                ),
                rule(&[RBAC_GROUP], &all, &all),
            ],
        }
    }

    fn cluster_role_rules(self) -> Vec<PolicyRule> {
        let all = ["*"];
        match self {
            Component::ClusterApiManager => vec![rule(
                &["apiextensions.k8s.io"],
                &["customresourcedefinitions"],
                &["get", "list", "watch"],
            )],
            Component::ControlPlaneOperator => vec![
                rule(&["apiextensions.k8s.io"], &["customresourcedefinitions"], &all),
                rule(&["config.openshift.io"], &all, &["get", "list", "watch"]),
                rule(&["operator.openshift.io"], &all, &all),
                rule(&["security.openshift.io"], &["securitycontextconstraints"], &all),
                rule(&[RBAC_GROUP], &all, &all),
            ],
            _ => Vec::new(),
        }
    }
}

fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(strings(groups)),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

fn service_account_subject(component: Component, namespace: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: component.name().to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

pub(super) fn role(role: &mut Role, component: Component) {
    role.rules = Some(component.role_rules());
}

pub(super) fn role_binding(binding: &mut RoleBinding, component: Component, namespace: &str) {
    binding.role_ref = RoleRef {
        api_group: RBAC_GROUP.to_string(),
        kind: "Role".to_string(),
        name: component.name().to_string(),
    };
    binding.subjects = Some(vec![service_account_subject(component, namespace)]);
}

pub(super) fn cluster_role(role: &mut ClusterRole, component: Component) {
    role.rules = Some(component.cluster_role_rules());
}

pub(super) fn cluster_role_binding(
    binding: &mut ClusterRoleBinding,
    component: Component,
    cluster_role: &str,
    namespace: &str,
) {
    binding.role_ref = RoleRef {
        api_group: RBAC_GROUP.to_string(),
        kind: "ClusterRole".to_string(),
        name: cluster_role.to_string(),
    };
    binding.subjects = Some(vec![service_account_subject(component, namespace)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(rules: &[PolicyRule], group: &str, resource: &str) -> bool {
        rules.iter().any(|r| {
            r.api_groups.as_ref().is_some_and(|g| g.iter().any(|x| x == group))
                && r.resources.as_ref().is_some_and(|res| res.iter().any(|x| x == resource || x == "*"))
        })
    }

    #[test]
    fn test_capi_manager_covers_all_capi_groups() {
        let rules = Component::ClusterApiManager.role_rules();
        for group in CAPI_GROUPS {
            assert!(grants(&rules, group, "machines"), "missing {group}");
        }
        assert!(grants(&rules, HYPERSHIFT_GROUP, "hostedcontrolplanes/status"));
    }

    #[test]
    fn test_only_shared_roles_are_unsuffixed() {
        assert_eq!(
            Component::ControlPlaneOperator.cluster_role_name("clusters-demo").as_deref(),
            Some("hypershift-control-plane-operator")
        );
        assert_eq!(
            Component::ClusterApiManager.cluster_role_name("clusters-demo").as_deref(),
            Some("cluster-api-clusters-demo")
        );
        assert_eq!(Component::Autoscaler.cluster_role_name("clusters-demo"), None);
        assert_eq!(Component::IgnitionServer.cluster_role_binding_name("clusters-demo"), None);
    }

    #[test]
    fn test_role_binding_targets_service_account() {
        let mut binding = RoleBinding::default();
        role_binding(&mut binding, Component::Autoscaler, "clusters-demo");

        assert_eq!(binding.role_ref.kind, "Role");
        assert_eq!(binding.role_ref.name, "cluster-autoscaler");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.kind, "ServiceAccount");
        assert_eq!(subject.namespace.as_deref(), Some("clusters-demo"));
    }
}
