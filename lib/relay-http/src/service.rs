//! Request routing for the registry gateway

use crate::configuration::{ConfigurationError, ConfigurationStore};
use crate::query::{parse_servers_query, ServersQuery};
use crate::response::{self, HttpResponse};
use hyper::{Method, Request, StatusCode, Uri};
use relay_core::{EndpointRecord, RelayRegistry};
use relay_sync::{RefreshMetrics, RefreshTrigger};
use std::sync::Arc;
use tracing::{debug, warn};

/// Serves registry queries, configuration files and operational endpoints:
///
/// - `GET /countries`
/// - `GET /servers?lat=&long=&limit=[&capability=]` or `GET /servers?country=`
/// - `GET /servers/{domain}/configuration`
/// - `GET /healthz`, `GET /readyz`, `GET /metrics`
/// - `POST /refresh` when a refresh trigger is attached
pub struct RelayService {
    registry: Arc<RelayRegistry>,
    configurations: ConfigurationStore,
    metrics: Option<RefreshMetrics>,
    trigger: Option<RefreshTrigger>,
}

impl RelayService {
    pub fn new(registry: Arc<RelayRegistry>, configurations: ConfigurationStore) -> Self {
        Self {
            registry,
            configurations,
            metrics: None,
            trigger: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RefreshMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_trigger(mut self, trigger: RefreshTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    /// hyper entry point; the request body is never read
    pub async fn handle<B>(&self, req: Request<B>) -> Result<HttpResponse, hyper::Error> {
        Ok(self.route(req.method(), req.uri()).await)
    }

    pub async fn route(&self, method: &Method, uri: &Uri) -> HttpResponse {
        let path = uri.path();
        debug!("{} {}", method, uri);

        if let Some(domain) = configuration_domain(path) {
            return match *method {
                Method::GET => self.configuration(domain).await,
                _ => response::method_not_allowed(),
            };
        }

        match (method, path) {
            (&Method::GET, "/countries") => self.countries().await,
            (&Method::GET, "/servers") => self.servers(uri.query()).await,
            (&Method::GET, "/healthz") => response::text(StatusCode::OK, "OK\n"),
            (&Method::GET, "/readyz") => self.readiness().await,
            (&Method::GET, "/metrics") => self.metrics(),
            (&Method::POST, "/refresh") => self.refresh(),
            (_, "/countries" | "/servers" | "/healthz" | "/readyz" | "/metrics" | "/refresh") => {
                response::method_not_allowed()
            }
            _ => response::not_found(path),
        }
    }

    async fn countries(&self) -> HttpResponse {
        match self.registry.countries().await {
            Ok(countries) => response::json(StatusCode::OK, &countries),
            Err(e) => response::core_error(&e),
        }
    }

    async fn servers(&self, query: Option<&str>) -> HttpResponse {
        let result = match parse_servers_query(query) {
            Ok(ServersQuery::Nearest {
                lat,
                long,
                limit,
                filter,
            }) => self.registry.nearest(lat, long, &filter, limit).await,
            Ok(ServersQuery::Country(country)) => self.registry.by_country(&country).await,
            Ok(ServersQuery::Unspecified) => Ok(Vec::<EndpointRecord>::new()),
            Err(e) => Err(e),
        };

        match result {
            Ok(servers) => response::json(StatusCode::OK, &servers),
            Err(e) => response::core_error(&e),
        }
    }

    async fn configuration(&self, domain: &str) -> HttpResponse {
        match self.configurations.read(domain).await {
            Ok(contents) => {
                debug!("Serving {} bytes of configuration for {}", contents.len(), domain);
                response::with_body(StatusCode::OK, "application/ovpn", contents)
            }
            Err(ConfigurationError::InvalidDomain(d)) => {
                response::text(StatusCode::BAD_REQUEST, format!("Invalid server domain: {}\n", d))
            }
            Err(ConfigurationError::NotFound(d)) => response::not_found(&d),
            Err(e) => {
                warn!("Failed reading configuration for {}: {}", domain, e);
                response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
            }
        }
    }

    async fn readiness(&self) -> HttpResponse {
        if self.registry.is_ready().await {
            response::text(StatusCode::OK, "READY\n")
        } else {
            response::text(StatusCode::SERVICE_UNAVAILABLE, "NOT READY\n")
        }
    }

    fn metrics(&self) -> HttpResponse {
        let Some(metrics) = &self.metrics else {
            return response::not_found("/metrics");
        };
        match metrics.gather() {
            Ok(text) => response::with_body(StatusCode::OK, "text/plain; version=0.0.4", text),
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                response::text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n")
            }
        }
    }

    fn refresh(&self) -> HttpResponse {
        match &self.trigger {
            Some(trigger) => {
                trigger.trigger();
                response::text(StatusCode::ACCEPTED, "Refresh scheduled\n")
            }
            None => response::not_found("/refresh"),
        }
    }
}

/// Extract `{domain}` from `/servers/{domain}/configuration`
fn configuration_domain(path: &str) -> Option<&str> {
    path.strip_prefix("/servers/")?
        .strip_suffix("/configuration")
        .filter(|domain| !domain.is_empty() && !domain.contains('/'))
}
