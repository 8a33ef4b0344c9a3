//! Kubernetes Object Store Client
//!
//! Typed get/list/create/update/patch/delete over any resource with static
//! type information, identified by [`ObjectKey`]. Every write is subject to
//! the API server's optimistic concurrency; conflicts surface as
//! [`StoreError::Conflict`].
//!
//! # Example
//!
//! ```no_run
//! use object_store::{create_or_update, KubeStore, ObjectKey, StoreError};
//! use k8s_openapi::api::core::v1::ConfigMap;
//!
//! # async fn example(client: kube::Client) -> Result<(), StoreError> {
//! let store = KubeStore::new(client);
//! let key = ObjectKey::namespaced("clusters-demo", "settings");
//!
//! let (_cm, result) = create_or_update::<_, ConfigMap, StoreError, _>(&store, &key, |cm| {
//!     cm.data.get_or_insert_with(Default::default)
//!         .insert("mode".to_string(), "hosted".to_string());
//!     Ok(())
//! })
//! .await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Create-or-update / create-or-patch**: mutate-function based sync with
//!   bounded in-place conflict retry and `Unchanged` detection
//! - **Finalizer-aware deletes**: [`DeleteOutcome`] distinguishes an issued
//!   delete from an object that is already gone
//! - **Mocking**: in-memory [`MockStore`] behind the `test-util` feature

pub mod client;
pub mod error;
pub mod key;
pub mod merge;
pub mod ops;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use key::ObjectKey;
pub use ops::{OperationResult, create_or_patch, create_or_update};
pub use store_trait::{DeleteOutcome, ObjectStore, StoreObject};
#[cfg(feature = "test-util")]
pub use mock::{Action, Failure, MockStore, Verb};
