//! Print the CRD manifests for every kind in this crate

use crds::{AWSCluster, Cluster, HostedCluster, HostedControlPlane, IBMCluster, NodePool, Route};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        HostedCluster::crd(),
        HostedControlPlane::crd(),
        NodePool::crd(),
        Cluster::crd(),
        AWSCluster::crd(),
        IBMCluster::crd(),
        Route::crd(),
    ];

    let docs = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", docs.join("---\n"));
    Ok(())
}
