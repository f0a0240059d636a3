//! Install session lifecycle.
//!
//! A session picks a port, provisions TLS, binds the listener and spawns the
//! HTTP server plus its status owner on the caller's actix system. It owns
//! the listening socket until [`InstallSession::shutdown`] or drop.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, web};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::assets::DisplayImages;
use crate::config::SessionConfig;
use crate::endpoints::Endpoints;
use crate::error::{SessionError, SessionFault};
use crate::models::AppMetadata;
use crate::port::PortAllocator;
use crate::request_log::RequestLog;
use crate::routes::{self, RouteState};
use crate::status::{SessionEvent, Status, StatusOwner};
use crate::tls::{self, TlsIdentity};

pub struct InstallSession {
    id: Uuid,
    port: u16,
    endpoints: Endpoints,
    metadata: AppMetadata,
    package: PathBuf,
    tls: bool,
    server: Mutex<Option<ServerHandle>>,
    snapshot: watch::Receiver<Status>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl InstallSession {
    /// Bind and start serving `package`.
    ///
    /// Must be called from within an actix system (`#[actix_web::main]`);
    /// the server and status owner are spawned onto it. Bind and TLS errors
    /// are returned here; everything after arrives through [`Self::take_events`].
    pub fn start(
        config: SessionConfig,
        package: impl Into<PathBuf>,
        metadata: AppMetadata,
        images: DisplayImages,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        metadata.validate()?;
        let package = package.into();
        let id = Uuid::new_v4();
        let port = PortAllocator::new(config.port_range).allocate();

        let identity = tls::provision(&config)?;
        let tls_config = identity
            .as_ref()
            .map(TlsIdentity::server_config)
            .transpose()?;
        let endpoints = Endpoints::new(config.advertised_base_url(port), id);

        let (owner, channels) = StatusOwner::new();
        let state = web::Data::new(RouteState::new(
            endpoints.clone(),
            metadata.clone(),
            package.clone(),
            images,
            channels.reporter.clone(),
        ));

        let addr = SocketAddr::new(config.bind_ip, port);
        let factory = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(RequestLog)
                .configure(routes::configure)
        })
        .workers(config.workers)
        .disable_signals();
        let bound = match tls_config {
            Some(tls_config) => factory.bind_rustls_0_22(addr, tls_config),
            None => factory.bind(addr),
        }
        .map_err(|source| SessionError::Bind { addr, source })?;

        let server = bound.run();
        let handle = server.handle();
        actix_web::rt::spawn(owner.run(channels.commands));
        let reporter = channels.reporter;
        actix_web::rt::spawn(async move {
            match server.await {
                Ok(()) => tracing::debug!("http server stopped"),
                Err(err) => reporter.transition(Status::Broken(SessionFault::Server(err.to_string()))),
            }
        });

        tracing::info!(
            session = %id,
            bind = %addr,
            tls = identity.is_some(),
            hostname = %config.hostname,
            package = %package.display(),
            bundle_id = %metadata.identifier,
            "install server started"
        );

        Ok(Self {
            id,
            port,
            endpoints,
            metadata,
            package,
            tls: identity.is_some(),
            server: Mutex::new(Some(handle)),
            snapshot: channels.snapshot,
            events: Some(channels.events),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn metadata(&self) -> &AppMetadata {
        &self.metadata
    }

    pub fn package(&self) -> &Path {
        &self.package
    }

    /// Whether TLS is terminated by this session rather than a proxy.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Latest status applied by the status owner.
    pub fn status(&self) -> Status {
        self.snapshot.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.snapshot.clone()
    }

    /// Resolve once the session reaches a terminal status. If the server
    /// stops first, returns whatever status was last applied.
    pub async fn wait_for_terminal(&self) -> Status {
        let mut rx = self.snapshot.clone();
        let result = rx.wait_for(Status::is_terminal).await.map(|s| s.clone());
        result.unwrap_or_else(|_| rx.borrow().clone())
    }

    /// Hand out the event receiver. There is one consumer per session; later
    /// calls return `None`.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    pub fn is_shut_down(&self) -> bool {
        match self.server.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Stop accepting connections and close the listener. In-flight
    /// requests may be cut off. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        let handle = match self.server.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            tracing::debug!(session = %self.id, "install server already shut down");
            return;
        };
        tracing::info!(
            session = %self.id,
            port = self.port,
            status = self.status().label(),
            "install server shutting down"
        );
        handle.stop(false).await;
    }
}

impl Drop for InstallSession {
    fn drop(&mut self) {
        let handle = match self.server.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            tracing::info!(session = %self.id, "install session dropped; stopping server");
            // The stop command is queued immediately; completion is not awaited.
            drop(handle.stop(false));
        }
    }
}
