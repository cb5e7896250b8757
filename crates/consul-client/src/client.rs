//! Consul HTTP API client
//!
//! Implements [`ConsulClientTrait`] against the agent's `/v1` endpoints.

use crate::common::{QueryMeta, QueryOptions, WriteOptions};
use crate::consul_trait::ConsulClientTrait;
use crate::error::ConsulError;
use crate::models::{
    AclPolicy, AclRole, CatalogDeregistration, CatalogRegistration, ConfigEntry, Namespace,
    ServiceTags, ServiceVirtualIpRequest,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use urlencoding::encode;

/// Timeout for ordinary (non-blocking) requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time allowed on top of a blocking query's `wait`.
const BLOCKING_SLACK: Duration = Duration::from_secs(15);

/// Consul HTTP API client
#[derive(Debug, Clone)]
pub struct ConsulClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ConsulClient {
    /// Create a new Consul client
    ///
    /// # Arguments
    /// * `base_url` - Agent address (e.g., "http://consul-server.consul:8500")
    /// * `token` - ACL token, if ACLs are enabled
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, ConsulError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Check that the agent answers and knows its leader.
    pub async fn validate_connection(&self) -> Result<(), ConsulError> {
        debug!("Validating Consul connectivity");
        let leader: String = self
            .read_json(self.client.get(self.url("/v1/status/leader")))
            .await?;
        if leader.is_empty() {
            return Err(ConsulError::Api {
                status: 500,
                body: "no cluster leader".to_string(),
            });
        }
        debug!(leader = %leader, "Consul connectivity established");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("X-Consul-Token", token),
            None => request,
        }
    }

    /// Send a request and map error statuses to typed errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ConsulError> {
        let response = self
            .authorized(request)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(ConsulError::NotFound(body)),
            401 | 403 => Err(ConsulError::Authentication(body)),
            code => Err(ConsulError::Api { status: code, body }),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ConsulError> {
        let response = self.send(request.timeout(REQUEST_TIMEOUT)).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn read_json_with_meta<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<(T, QueryMeta), ConsulError> {
        let response = self.send(request).await?;
        let meta = QueryMeta {
            last_index: response
                .headers()
                .get("X-Consul-Index")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        };
        let text = response.text().await?;
        Ok((serde_json::from_str(&text)?, meta))
    }

    /// Turn a typed not-found into `None`.
    fn optional<T>(result: Result<T, ConsulError>) -> Result<Option<T>, ConsulError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(ConsulError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl ConsulClientTrait for ConsulClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_config_entry(
        &self,
        kind: &str,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<(ConfigEntry, QueryMeta), ConsulError> {
        let url = self.url(&format!("/v1/config/{}/{}", encode(kind), encode(name)));
        debug!(kind, name, "Reading config entry");
        self.read_json_with_meta(
            self.client
                .get(url)
                .query(&opts.query_pairs())
                .timeout(REQUEST_TIMEOUT),
        )
        .await
    }

    async fn set_config_entry(
        &self,
        entry: &ConfigEntry,
        opts: &WriteOptions,
    ) -> Result<bool, ConsulError> {
        debug!(kind = %entry.kind, name = %entry.name, "Writing config entry");
        self.read_json(
            self.client
                .put(self.url("/v1/config"))
                .query(&opts.query_pairs())
                .json(entry),
        )
        .await
    }

    async fn delete_config_entry(
        &self,
        kind: &str,
        name: &str,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        let url = self.url(&format!("/v1/config/{}/{}", encode(kind), encode(name)));
        debug!(kind, name, "Deleting config entry");
        self.send(
            self.client
                .delete(url)
                .query(&opts.query_pairs())
                .timeout(REQUEST_TIMEOUT),
        )
        .await?;
        Ok(())
    }

    async fn catalog_services(
        &self,
        opts: &QueryOptions,
    ) -> Result<(ServiceTags, QueryMeta), ConsulError> {
        let timeout = opts
            .wait_time
            .map_or(REQUEST_TIMEOUT, |wait| wait + wait / 16 + BLOCKING_SLACK);
        self.read_json_with_meta(
            self.client
                .get(self.url("/v1/catalog/services"))
                .query(&opts.query_pairs())
                .timeout(timeout),
        )
        .await
    }

    async fn catalog_register(
        &self,
        registration: &CatalogRegistration,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        debug!(node = %registration.node, "Registering catalog entry");
        let _: bool = self
            .read_json(
                self.client
                    .put(self.url("/v1/catalog/register"))
                    .query(&opts.query_pairs())
                    .json(registration),
            )
            .await?;
        Ok(())
    }

    async fn catalog_deregister(
        &self,
        deregistration: &CatalogDeregistration,
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        debug!(node = %deregistration.node, service_id = %deregistration.service_id, "Deregistering catalog entry");
        let _: bool = self
            .read_json(
                self.client
                    .put(self.url("/v1/catalog/deregister"))
                    .query(&opts.query_pairs())
                    .json(deregistration),
            )
            .await?;
        Ok(())
    }

    async fn acl_policy_read_by_name(
        &self,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<Option<AclPolicy>, ConsulError> {
        let url = self.url(&format!("/v1/acl/policy/name/{}", encode(name)));
        Self::optional(
            self.read_json(self.client.get(url).query(&opts.query_pairs()))
                .await,
        )
    }

    async fn acl_policy_create(
        &self,
        policy: &AclPolicy,
        opts: &WriteOptions,
    ) -> Result<AclPolicy, ConsulError> {
        if !policy.id.is_empty() {
            return Err(ConsulError::InvalidRequest(
                "cannot specify an ID in policy creation".to_string(),
            ));
        }
        self.read_json(
            self.client
                .put(self.url("/v1/acl/policy"))
                .query(&opts.query_pairs())
                .json(policy),
        )
        .await
    }

    async fn acl_policy_delete(&self, id: &str, opts: &WriteOptions) -> Result<(), ConsulError> {
        let url = self.url(&format!("/v1/acl/policy/{}", encode(id)));
        self.send(
            self.client
                .delete(url)
                .query(&opts.query_pairs())
                .timeout(REQUEST_TIMEOUT),
        )
        .await?;
        Ok(())
    }

    async fn acl_role_list(&self, opts: &QueryOptions) -> Result<Vec<AclRole>, ConsulError> {
        self.read_json(
            self.client
                .get(self.url("/v1/acl/roles"))
                .query(&opts.query_pairs()),
        )
        .await
    }

    async fn acl_role_read(
        &self,
        id: &str,
        opts: &QueryOptions,
    ) -> Result<Option<AclRole>, ConsulError> {
        let url = self.url(&format!("/v1/acl/role/{}", encode(id)));
        Self::optional(
            self.read_json(self.client.get(url).query(&opts.query_pairs()))
                .await,
        )
    }

    async fn acl_role_update(
        &self,
        role: &AclRole,
        opts: &WriteOptions,
    ) -> Result<AclRole, ConsulError> {
        if role.id.is_empty() {
            return Err(ConsulError::InvalidRequest(
                "must specify an ID in role update".to_string(),
            ));
        }
        let url = self.url(&format!("/v1/acl/role/{}", encode(&role.id)));
        self.read_json(self.client.put(url).query(&opts.query_pairs()).json(role))
            .await
    }

    async fn namespace_read(
        &self,
        name: &str,
        opts: &QueryOptions,
    ) -> Result<Option<Namespace>, ConsulError> {
        let url = self.url(&format!("/v1/namespace/{}", encode(name)));
        Self::optional(
            self.read_json(self.client.get(url).query(&opts.query_pairs()))
                .await,
        )
    }

    async fn namespace_create(
        &self,
        namespace: &Namespace,
        opts: &WriteOptions,
    ) -> Result<Namespace, ConsulError> {
        self.read_json(
            self.client
                .put(self.url("/v1/namespace"))
                .query(&opts.query_pairs())
                .json(namespace),
        )
        .await
    }

    async fn assign_service_virtual_ip(
        &self,
        service: &str,
        manual_vips: &[String],
        opts: &WriteOptions,
    ) -> Result<(), ConsulError> {
        let body = ServiceVirtualIpRequest {
            service: service.to_string(),
            manual_vips: manual_vips.to_vec(),
        };
        self.send(
            self.client
                .put(self.url("/v1/internal/service-virtual-ip"))
                .query(&opts.query_pairs())
                .json(&body)
                .timeout(REQUEST_TIMEOUT),
        )
        .await?;
        Ok(())
    }
}
