//! Kubernetes resource watchers.
//!
//! Every kind runs in its own `kube_runtime::Controller` through the generic
//! `watch_resource()` helper, which:
//! - records reconcile counts and latency per kind
//! - paces retries with the process-wide [`RequeueLimiter`]
//! - skips events that did not change the object's generation, so the status
//!   writes a reconcile makes do not trigger another reconcile
//!
//! Registrations are additionally re-queued when a TerminatingGateway that
//! lists their service changes.

use crate::backoff::RequeueLimiter;
use crate::error::ControllerError;
use crate::metrics::{Metrics, RESULT_ERROR, RESULT_SUCCESS};
use crate::reconciler::Reconciler;
use crate::registration::reconciler::RegistrationReconciler;
use crate::store::KubeStore;
use crds::{ConfigEntryResource, Registration, TerminatingGateway};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Quiet period after the last event before reconciling.
pub const DEBOUNCE: Duration = Duration::from_secs(1);

/// Concurrent reconciles per kind.
pub const CONCURRENCY: u16 = 3;

/// `namespace/name`, or `name` for cluster-scoped objects.
fn object_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Last successfully reconciled generation per object.
#[derive(Debug, Default)]
pub struct GenerationGate {
    seen: Mutex<HashMap<String, i64>>,
}

impl GenerationGate {
    fn seen(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `meta` describes a generation already reconciled. Objects
    /// being deleted are never current.
    pub fn is_current(&self, key: &str, meta: &ObjectMeta) -> bool {
        if meta.deletion_timestamp.is_some() {
            return false;
        }
        meta.generation
            .is_some_and(|generation| self.seen().get(key) == Some(&generation))
    }

    /// Remember the generation of a successful reconcile.
    pub fn record(&self, key: &str, meta: &ObjectMeta) {
        if meta.deletion_timestamp.is_some() {
            self.forget(key);
            return;
        }
        if let Some(generation) = meta.generation {
            self.seen().insert(key.to_string(), generation);
        }
    }

    /// Force the next event for `key` through.
    pub fn forget(&self, key: &str) {
        self.seen().remove(key);
    }
}

/// Shared state handed to every reconcile of one kind.
pub struct WatchContext<S> {
    state: S,
    kind: String,
    metrics: Arc<Metrics>,
    limiter: Arc<RequeueLimiter>,
    gate: Arc<GenerationGate>,
}

impl<S> Debug for WatchContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<S> WatchContext<S> {
    fn limiter_key(&self, key: &str) -> String {
        format!("{}/{key}", self.kind)
    }
}

fn error_policy<K, S>(obj: Arc<K>, error: &ControllerError, ctx: Arc<WatchContext<S>>) -> Action
where
    K: Resource,
{
    let key = object_key(obj.meta().namespace.as_deref(), &obj.name_any());
    let delay = ctx.limiter.when(&ctx.limiter_key(&key));
    error!(
        kind = %ctx.kind,
        name = %key,
        error = %error,
        retry_in_ms = delay.as_millis(),
        "Reconciliation failed, requeueing"
    );
    Action::requeue(delay)
}

/// Run `controller` until `shutdown` fires, reconciling through `reconcile_fn`.
async fn watch_resource<K, S, F, Fut>(
    controller: Controller<K>,
    ctx: Arc<WatchContext<S>>,
    shutdown: CancellationToken,
    reconcile_fn: F,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    S: Send + Sync + 'static,
    F: Fn(Arc<WatchContext<S>>, Arc<K>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), ControllerError>> + Send + 'static,
{
    let kind = ctx.kind.clone();
    info!(%kind, "Starting watcher");

    let reconcile = move |obj: Arc<K>, ctx: Arc<WatchContext<S>>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = object_key(obj.meta().namespace.as_deref(), &obj.name_any());
            if ctx.gate.is_current(&key, obj.meta()) {
                debug!(kind = %ctx.kind, name = %key, "Generation already reconciled");
                return Ok(Action::await_change());
            }

            debug!(kind = %ctx.kind, name = %key, "Reconciling");
            let started = Instant::now();
            let result = reconcile_fn(Arc::clone(&ctx), Arc::clone(&obj)).await;
            let elapsed = started.elapsed();
            match result {
                Ok(()) => {
                    ctx.metrics.record_reconcile(&ctx.kind, RESULT_SUCCESS, elapsed);
                    ctx.limiter.forget(&ctx.limiter_key(&key));
                    ctx.gate.record(&key, obj.meta());
                    Ok(Action::await_change())
                }
                Err(e) => {
                    ctx.metrics.record_reconcile(&ctx.kind, RESULT_ERROR, elapsed);
                    Err(e)
                }
            }
        }
    };

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(CONCURRENCY);

    controller
        .with_config(controller_config)
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy::<K, S>, ctx)
        .for_each(|res| {
            let kind = kind.clone();
            async move {
                match res {
                    Ok((obj, _)) => debug!(%kind, name = %obj.name, "Reconciled"),
                    Err(e) => warn!(%kind, error = %e, "Controller error"),
                }
            }
        })
        .await;

    info!(%kind, "Watcher stopped");
    Ok(())
}

/// Registrations that `gateway` fronts.
pub fn registrations_for_gateway(
    gateway: &TerminatingGateway,
    registrations: &[Arc<Registration>],
) -> Vec<ObjectRef<Registration>> {
    registrations
        .iter()
        .filter(|r| gateway.links_service(r.service_name(), r.service_namespace()))
        .map(|r| ObjectRef::from_obj(&**r))
        .collect()
}

/// Config-entry reconciles of one kind.
struct EntrySync<K> {
    reconciler: Arc<Reconciler>,
    store: KubeStore<K>,
}

/// Starts the per-kind controllers.
pub struct Watcher {
    client: Client,
    watch_namespace: Option<String>,
    metrics: Arc<Metrics>,
    limiter: Arc<RequeueLimiter>,
    shutdown: CancellationToken,
}

impl Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("watch_namespace", &self.watch_namespace)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        client: Client,
        watch_namespace: Option<String>,
        metrics: Arc<Metrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            watch_namespace,
            metrics,
            limiter: Arc::new(RequeueLimiter::new()),
            shutdown,
        }
    }

    fn context<S>(&self, kind: String, state: S, gate: Arc<GenerationGate>) -> Arc<WatchContext<S>> {
        Arc::new(WatchContext {
            state,
            kind,
            metrics: Arc::clone(&self.metrics),
            limiter: Arc::clone(&self.limiter),
            gate,
        })
    }

    /// Watch config entries of kind `K`.
    pub async fn watch_config_entries<K: ConfigEntryResource>(
        &self,
        reconciler: Arc<Reconciler>,
    ) -> Result<(), ControllerError> {
        let api: Api<K> = match &self.watch_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let state = EntrySync {
            reconciler,
            store: KubeStore::<K>::namespaced(self.client.clone()),
        };
        let ctx = self.context(K::kind(&()).into_owned(), state, Arc::default());

        watch_resource(
            Controller::new(api, watcher::Config::default()),
            ctx,
            self.shutdown.clone(),
            |ctx: Arc<WatchContext<EntrySync<K>>>, resource: Arc<K>| async move {
                let namespace = resource.namespace().unwrap_or_default();
                ctx.state
                    .reconciler
                    .reconcile_entry::<K>(&ctx.state.store, &namespace, &resource.name_any())
                    .await
            },
        )
        .await
    }

    /// Watch Registrations and the TerminatingGateways that front them.
    pub async fn watch_registrations(
        &self,
        reconciler: Arc<RegistrationReconciler>,
    ) -> Result<(), ControllerError> {
        let gate = Arc::new(GenerationGate::default());
        let controller = Controller::new(
            Api::<Registration>::all(self.client.clone()),
            watcher::Config::default(),
        );
        let registrations = controller.store();
        let mapper_gate = Arc::clone(&gate);
        let controller = controller.watches(
            Api::<TerminatingGateway>::all(self.client.clone()),
            watcher::Config::default(),
            move |gateway: TerminatingGateway| {
                let refs = registrations_for_gateway(&gateway, &registrations.state());
                for r in &refs {
                    mapper_gate.forget(&object_key(r.namespace.as_deref(), &r.name));
                }
                refs
            },
        );
        let ctx = self.context(Registration::kind(&()).into_owned(), reconciler, gate);

        watch_resource(
            controller,
            ctx,
            self.shutdown.clone(),
            |ctx: Arc<WatchContext<Arc<RegistrationReconciler>>>, registration: Arc<Registration>| async move {
                ctx.state.reconcile(&registration.name_any()).await
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use serde_json::json;

    fn meta(generation: i64) -> ObjectMeta {
        ObjectMeta {
            generation: Some(generation),
            ..Default::default()
        }
    }

    #[test]
    fn test_gate_skips_reconciled_generation_only() {
        let gate = GenerationGate::default();
        assert!(!gate.is_current("apps/web", &meta(1)));

        gate.record("apps/web", &meta(1));
        assert!(gate.is_current("apps/web", &meta(1)));
        assert!(!gate.is_current("apps/web", &meta(2)));
        assert!(!gate.is_current("apps/api", &meta(1)));

        gate.forget("apps/web");
        assert!(!gate.is_current("apps/web", &meta(1)));
    }

    #[test]
    fn test_gate_never_skips_deletions() {
        let gate = GenerationGate::default();
        gate.record("apps/web", &meta(3));
        let deleting: ObjectMeta = serde_json::from_value(json!({
            "generation": 3,
            "deletionTimestamp": "2024-05-01T12:00:00Z",
        }))
        .unwrap();

        assert!(!gate.is_current("apps/web", &deleting));
        gate.record("apps/web", &deleting);
        assert!(!gate.is_current("apps/web", &meta(3)));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(Some("apps"), "web"), "apps/web");
        assert_eq!(object_key(None, "test-registration"), "test-registration");
        assert_eq!(object_key(Some(""), "test-registration"), "test-registration");
    }

    #[test]
    fn test_gateway_requeues_only_linked_registrations() {
        let registrations = vec![
            Arc::new(create_test_registration("reg-billing", "billing", "")),
            Arc::new(create_test_registration("reg-ledger", "ledger", "finance")),
            Arc::new(create_test_registration("reg-web", "web", "")),
        ];
        let gateway = create_test_terminating_gateway(
            "terminating-gateway",
            &[("billing", ""), ("ledger", "finance"), ("web", "other")],
        );

        let refs = registrations_for_gateway(&gateway, &registrations);

        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["reg-billing", "reg-ledger"]);
    }
}
