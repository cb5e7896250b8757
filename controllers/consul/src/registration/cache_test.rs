//! Unit tests for the registration cache and catalog watch

#[cfg(test)]
mod tests {
    use super::super::cache::*;
    use super::super::RegistrationSettings;
    use crate::store::ResourceStore;
    use crate::test_utils::*;
    use consul_client::{ConsulClientTrait, MockConsulClient, MockOperation, ServiceTags};
    use crds::Registration;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const WAIT: Duration = Duration::from_secs(5);

    fn cache_with(
        consul: &MockConsulClient,
        store: Arc<InMemoryStore<Registration>>,
    ) -> (Arc<RegistrationCache>, mpsc::Receiver<String>, CancellationToken) {
        let consul: Arc<dyn ConsulClientTrait> = Arc::new(consul.clone());
        let registrations: Arc<dyn ResourceStore<Registration>> = store;
        let shutdown = CancellationToken::new();
        let (cache, rx) = RegistrationCache::new(
            consul,
            registrations,
            RegistrationSettings::default(),
            shutdown.clone(),
        );
        (cache, rx, shutdown)
    }

    fn catalog(services: &[&str]) -> ServiceTags {
        services
            .iter()
            .map(|service| ((*service).to_string(), Vec::new()))
            .collect()
    }

    #[tokio::test]
    async fn test_sync_once_diffs_cache_against_catalog() {
        let consul = MockConsulClient::default();
        let store = Arc::new(InMemoryStore::for_registrations());
        store.insert(create_test_registration("reg-c", "c", ""));
        let (cache, mut rx, shutdown) = cache_with(&consul, store);

        let b = create_test_registration("reg-b", "b", "");
        cache.set("a", create_test_registration("reg-a", "a", ""));
        cache.set("b", b.clone());

        assert!(cache.sync_once(&catalog(&["b", "c", "consul"]), &shutdown).await);

        assert_eq!(rx.try_recv().ok().as_deref(), Some("a"));
        assert!(rx.try_recv().is_err());
        assert_eq!(cache.get("c").map(|r| r.spec.service.name), Some("c".to_string()));
        assert_eq!(cache.get("b"), Some(b));
        assert!(cache.get("consul").is_none());
        assert!(cache.get("a").is_none());
    }

    #[tokio::test]
    async fn test_sync_once_reports_each_removal_once() {
        let consul = MockConsulClient::default();
        let (cache, mut rx, shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));
        cache.set("a", create_test_registration("reg-a", "a", ""));

        assert!(cache.sync_once(&catalog(&["x"]), &shutdown).await);
        assert!(cache.sync_once(&catalog(&["x", "y"]), &shutdown).await);

        assert_eq!(rx.try_recv().ok().as_deref(), Some("a"));
        assert!(rx.try_recv().is_err());
        assert!(cache.get("a").is_none());
    }

    #[tokio::test]
    async fn test_sync_once_ignores_services_without_registration() {
        let consul = MockConsulClient::default();
        let (cache, mut rx, shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));

        assert!(cache.sync_once(&catalog(&["unknown"]), &shutdown).await);

        assert!(cache.get("unknown").is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sync_once_stops_when_cancelled_on_full_channel() {
        let consul = MockConsulClient::default();
        let (cache, _rx, shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));
        for i in 0..100 {
            let service = format!("svc-{i}");
            cache.set(&service, create_test_registration(&service, &service, ""));
        }
        shutdown.cancel();

        assert!(!cache.sync_once(&ServiceTags::new(), &shutdown).await);
    }

    #[tokio::test]
    async fn test_register_service_writes_catalog_and_caches() {
        let consul = MockConsulClient::default();
        let (cache, _rx, _shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));
        let registration = create_test_registration("test-registration", "service-name", "");

        cache.register_service(&registration).await.unwrap();

        assert!(consul.registration("", "external-node", "service-name-1").is_some());
        assert_eq!(cache.get("service-name"), Some(registration));
    }

    #[tokio::test]
    async fn test_register_service_skips_unchanged_registration() {
        let consul = MockConsulClient::default();
        let (cache, _rx, _shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));
        let registration = create_test_registration("test-registration", "service-name", "");

        cache.register_service(&registration).await.unwrap();
        let mut with_status = registration.clone();
        with_status.status = Some(Default::default());
        cache.register_service(&with_status).await.unwrap();

        assert_eq!(consul.calls(MockOperation::CatalogRegister), 1);
    }

    #[tokio::test]
    async fn test_register_service_failure_leaves_cache_untouched() {
        let consul = MockConsulClient::default();
        consul.fail_on(MockOperation::CatalogRegister);
        let (cache, _rx, _shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));

        let result = cache
            .register_service(&create_test_registration("test-registration", "service-name", ""))
            .await;

        assert!(result.is_err());
        assert!(cache.get("service-name").is_none());
    }

    #[tokio::test]
    async fn test_register_in_new_namespace_starts_watch() {
        let consul = MockConsulClient::default();
        let (cache, _rx, shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));

        cache
            .register_service(&create_test_registration("reg", "billing", "payments"))
            .await
            .unwrap();
        cache
            .register_service(&create_test_registration("reg-2", "ledger", "payments"))
            .await
            .unwrap();
        cache
            .register_service(&create_test_registration("reg-3", "web", "default"))
            .await
            .unwrap();

        let namespaces = cache.watched_namespaces();
        assert!(namespaces.contains("payments"));
        assert_eq!(namespaces.len(), 1);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_deregister_service_drops_cache_entry() {
        let consul = MockConsulClient::default();
        let (cache, _rx, _shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));
        let registration = create_test_registration("test-registration", "service-name", "");
        cache.register_service(&registration).await.unwrap();

        cache.deregister_service(&registration).await.unwrap();

        assert!(cache.get("service-name").is_none());
        assert!(consul.registration("", "external-node", "service-name-1").is_none());
    }

    #[tokio::test]
    async fn test_deregister_failure_keeps_cache_entry() {
        let consul = MockConsulClient::default();
        let (cache, _rx, _shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));
        let registration = create_test_registration("test-registration", "service-name", "");
        cache.register_service(&registration).await.unwrap();
        consul.fail_on(MockOperation::CatalogDeregister);

        assert!(cache.deregister_service(&registration).await.is_err());
        assert!(cache.get("service-name").is_some());
    }

    #[tokio::test]
    async fn test_watch_loop_syncs_and_reports_removals() {
        let consul = MockConsulClient::default();
        consul.add_catalog_service("", "external", BTreeMap::new());
        let mut managed = BTreeMap::new();
        managed.insert(
            "managed-by".to_string(),
            "consul-k8s-endpoints-controller".to_string(),
        );
        consul.add_catalog_service("", "in-mesh", managed);
        let store = Arc::new(InMemoryStore::for_registrations());
        store.insert(create_test_registration("reg-external", "external", ""));
        store.insert(create_test_registration("reg-in-mesh", "in-mesh", ""));
        let (cache, mut rx, shutdown) = cache_with(&consul, store);

        let handle = cache.start();
        tokio::time::timeout(WAIT, cache.wait_synced()).await.unwrap();

        assert!(*cache.ready().borrow());
        assert!(cache.get("external").is_some());
        assert!(cache.get("in-mesh").is_none());

        consul.remove_catalog_service("", "external");
        let removed = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(removed.as_deref(), Some("external"));

        shutdown.cancel();
        tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_loop_retries_after_errors() {
        let consul = MockConsulClient::default();
        consul.fail_on(MockOperation::CatalogServices);
        let (cache, _rx, shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));

        let handle = cache.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*cache.ready().borrow());

        consul.clear_failures();
        tokio::time::timeout(WAIT, cache.wait_synced()).await.unwrap();
        assert!(*cache.ready().borrow());
        assert!(consul.calls(MockOperation::CatalogServices) >= 2);

        shutdown.cancel();
        tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_loop_backs_off_between_failed_polls() {
        let consul = MockConsulClient::default();
        consul.fail_on(MockOperation::CatalogServices);
        let (cache, _rx, shutdown) = cache_with(&consul, Arc::new(InMemoryStore::for_registrations()));

        let handle = cache.start();
        // First retry waits 200ms, the second another 400ms.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(consul.calls(MockOperation::CatalogServices), 1);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(consul.calls(MockOperation::CatalogServices), 2);

        shutdown.cancel();
        tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    }
}
