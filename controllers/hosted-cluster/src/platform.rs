//! Platform-specific pieces of convergence.
//!
//! Everything that differs between AWS, IBM Cloud and the bare `None`
//! platform sits behind [`PlatformSupport`]: which credentials get copied,
//! how the control plane's platform block looks, which infrastructure record
//! Cluster API is pointed at and whether a provider controller is deployed.

use async_trait::async_trait;
use crds::{
    APIEndpoint, AWSCluster, HostedCluster, IBMCluster, LocalObjectReference, PlatformSpec,
    PlatformType, TypedObjectReference,
};
use object_store::ObjectStore;

use crate::builders::SecretCopy;
use crate::error::ControllerError;
use crate::manifests::{keys, secrets};
use crate::reconciler::Reconciler;

/// Per-platform convergence hooks
#[async_trait]
pub trait PlatformSupport<S: ObjectStore>: Send + Sync {
    /// Platform served by this implementation
    fn platform_type(&self) -> PlatformType;

    /// Credentials copied into the control plane namespace
    fn credential_copies(&self, _hc: &HostedCluster) -> Result<Vec<SecretCopy>, ControllerError> {
        Ok(Vec::new())
    }

    /// Platform block of the HostedControlPlane
    fn control_plane_platform(&self, hc: &HostedCluster) -> PlatformSpec {
        hc.spec.platform.clone()
    }

    /// Sync the infrastructure record; `None` until it can be created
    async fn reconcile_infrastructure(
        &self,
        reconciler: &Reconciler<S>,
        hc: &HostedCluster,
        cp_namespace: &str,
        endpoint: &APIEndpoint,
    ) -> Result<Option<TypedObjectReference>, ControllerError>;

    /// Deploy the platform's Cluster API provider, if it has one
    async fn reconcile_provider(
        &self,
        _reconciler: &Reconciler<S>,
        _hc: &HostedCluster,
        _cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        Ok(())
    }
}

/// Amazon Web Services
#[derive(Debug, Default)]
pub struct AwsPlatform;

#[async_trait]
impl<S: ObjectStore> PlatformSupport<S> for AwsPlatform {
    fn platform_type(&self) -> PlatformType {
        PlatformType::Aws
    }

    fn credential_copies(&self, hc: &HostedCluster) -> Result<Vec<SecretCopy>, ControllerError> {
        let aws = hc.spec.platform.aws.as_ref().ok_or_else(|| {
            ControllerError::InvalidConfig("AWS platform requires spec.platform.aws".to_string())
        })?;
        Ok(vec![
            SecretCopy::key(
                "cloud controller",
                &aws.kube_cloud_controller_creds.name,
                secrets::CLOUD_CONTROLLER_CREDS,
                keys::AWS_CREDENTIALS,
            ),
            SecretCopy::key(
                "node pool management",
                &aws.node_pool_management_creds.name,
                secrets::NODE_MANAGEMENT_CREDS,
                keys::AWS_CREDENTIALS,
            ),
        ])
    }

    fn control_plane_platform(&self, hc: &HostedCluster) -> PlatformSpec {
        let mut platform = hc.spec.platform.clone();
        if let Some(aws) = platform.aws.as_mut() {
            aws.kube_cloud_controller_creds = LocalObjectReference::new(secrets::CLOUD_CONTROLLER_CREDS);
            aws.node_pool_management_creds = LocalObjectReference::new(secrets::NODE_MANAGEMENT_CREDS);
        }
        platform
    }

    async fn reconcile_infrastructure(
        &self,
        reconciler: &Reconciler<S>,
        hc: &HostedCluster,
        cp_namespace: &str,
        endpoint: &APIEndpoint,
    ) -> Result<Option<TypedObjectReference>, ControllerError> {
        reconciler
            .sync_infrastructure::<AWSCluster, _>(hc, cp_namespace, endpoint, |infra| {
                reconciler.builders.aws_cluster(infra, hc, endpoint)
            })
            .await
    }

    async fn reconcile_provider(
        &self,
        reconciler: &Reconciler<S>,
        hc: &HostedCluster,
        cp_namespace: &str,
    ) -> Result<(), ControllerError> {
        reconciler.sync_capi_aws_provider(hc, cp_namespace).await
    }
}

/// No cloud integration; an externally managed AWSCluster stands in as the
/// infrastructure record
#[derive(Debug, Default)]
pub struct NonePlatform;

#[async_trait]
impl<S: ObjectStore> PlatformSupport<S> for NonePlatform {
    fn platform_type(&self) -> PlatformType {
        PlatformType::None
    }

    async fn reconcile_infrastructure(
        &self,
        reconciler: &Reconciler<S>,
        hc: &HostedCluster,
        cp_namespace: &str,
        endpoint: &APIEndpoint,
    ) -> Result<Option<TypedObjectReference>, ControllerError> {
        reconciler
            .sync_infrastructure::<AWSCluster, _>(hc, cp_namespace, endpoint, |infra| {
                reconciler.builders.aws_cluster(infra, hc, endpoint)
            })
            .await
    }
}

/// IBM Cloud
#[derive(Debug, Default)]
pub struct IbmCloudPlatform;

#[async_trait]
impl<S: ObjectStore> PlatformSupport<S> for IbmCloudPlatform {
    fn platform_type(&self) -> PlatformType {
        PlatformType::IbmCloud
    }

    async fn reconcile_infrastructure(
        &self,
        reconciler: &Reconciler<S>,
        hc: &HostedCluster,
        cp_namespace: &str,
        endpoint: &APIEndpoint,
    ) -> Result<Option<TypedObjectReference>, ControllerError> {
        reconciler
            .sync_infrastructure::<IBMCluster, _>(hc, cp_namespace, endpoint, |infra| {
                reconciler.builders.ibm_cluster(infra, endpoint)
            })
            .await
    }
}

/// Platform support for a platform type
pub fn platform_support<S: ObjectStore>(platform: PlatformType) -> Box<dyn PlatformSupport<S>> {
    match platform {
        PlatformType::Aws => Box::new(AwsPlatform),
        PlatformType::None => Box::new(NonePlatform),
        PlatformType::IbmCloud => Box::new(IbmCloudPlatform),
    }
}
