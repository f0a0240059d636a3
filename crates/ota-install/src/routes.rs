//! Request routing for an install session.
//!
//! The route table is fixed per session and matched exactly (case-sensitive,
//! query ignored). Manifest, image and payload hits request a status
//! transition through the session's [`StatusReporter`]; nothing else touches
//! status.

use std::path::PathBuf;

use actix_web::body::SizedStream;
use actix_web::http::{Method, header};
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse, web};

use crate::assets::DisplayImages;
use crate::endpoints::{
    Endpoints, INDEX_PATHS, LARGE_IMAGE_PATH, PING_PATH, REDIRECT_PATH, SMALL_IMAGE_PATH,
};
use crate::manifest::{self, ImageUrls};
use crate::models::AppMetadata;
use crate::payload::{GuardedBody, PayloadStream};
use crate::status::{Status, StatusReporter};

/// Everything the handlers borrow from the session.
pub struct RouteState {
    pub(crate) endpoints: Endpoints,
    pub(crate) metadata: AppMetadata,
    pub(crate) package: PathBuf,
    pub(crate) images: DisplayImages,
    pub(crate) status: StatusReporter,
}

impl RouteState {
    pub fn new(
        endpoints: Endpoints,
        metadata: AppMetadata,
        package: PathBuf,
        images: DisplayImages,
        status: StatusReporter,
    ) -> Self {
        Self {
            endpoints,
            metadata,
            package,
            images,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ping,
    Index,
    Redirect,
    Manifest,
    SmallImage,
    LargeImage,
    Payload,
    MethodNotAllowed,
    NotFound,
}

pub fn route(method: &Method, path: &str, endpoints: &Endpoints) -> Route {
    let target = match path {
        PING_PATH => Route::Ping,
        REDIRECT_PATH => Route::Redirect,
        SMALL_IMAGE_PATH => Route::SmallImage,
        LARGE_IMAGE_PATH => Route::LargeImage,
        p if INDEX_PATHS.contains(&p) => Route::Index,
        p if p == endpoints.manifest_path() => Route::Manifest,
        p if p == endpoints.payload_path() => Route::Payload,
        _ => return Route::NotFound,
    };
    if *method != Method::GET {
        return Route::MethodNotAllowed;
    }
    target
}

/// Mount the session's route table on an actix app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(dispatch));
}

async fn dispatch(req: HttpRequest, state: web::Data<RouteState>) -> HttpResponse {
    match route(req.method(), req.path(), &state.endpoints) {
        Route::Ping => HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, "text/plain"))
            .body("pong"),
        Route::Index => html(manifest::landing_page(REDIRECT_PATH, &state.metadata.name)),
        Route::Redirect => {
            let target = manifest::install_url(
                &state.endpoints.manifest_url(),
                &state.metadata,
                &state.endpoints.payload_url(),
            );
            html(manifest::build_redirect(&target))
        }
        Route::Manifest => serve_manifest(&state),
        Route::SmallImage => serve_image(&state, SMALL_IMAGE_PATH, state.images.small.clone()),
        Route::LargeImage => serve_image(&state, LARGE_IMAGE_PATH, state.images.large.clone()),
        Route::Payload => serve_payload(&state).await,
        Route::MethodNotAllowed => HttpResponse::MethodNotAllowed().finish(),
        Route::NotFound => HttpResponse::NotFound().finish(),
    }
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/html"))
        .body(body)
}

fn guarded(state: &RouteState, path: &str, content_type: &str, body: Bytes) -> HttpResponse {
    let body = GuardedBody::new(body, path, state.status.clone());
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, content_type.to_string()))
        .body(SizedStream::new(body.len(), body))
}

fn serve_manifest(state: &RouteState) -> HttpResponse {
    let images = ImageUrls {
        small: state.endpoints.small_image_url(),
        large: state.endpoints.large_image_url(),
    };
    let doc = manifest::build_manifest(
        &state.metadata,
        &state.endpoints.payload_url(),
        Some(&images),
    );
    let xml = match doc.to_xml() {
        Ok(xml) => xml,
        Err(err) => {
            tracing::error!(error = %err, "manifest serialization failed");
            return HttpResponse::InternalServerError().finish();
        }
    };
    state.status.transition(Status::SendingManifest);
    guarded(state, state.endpoints.manifest_path(), "text/xml", Bytes::from(xml))
}

fn serve_image(state: &RouteState, path: &str, png: Bytes) -> HttpResponse {
    state.status.transition(Status::SendingManifest);
    guarded(state, path, "image/png", png)
}

async fn serve_payload(state: &RouteState) -> HttpResponse {
    state.status.transition(Status::SendingPayload);
    match PayloadStream::open(&state.package, state.status.clone()).await {
        Ok(stream) => {
            tracing::info!(
                path = %state.package.display(),
                bytes = stream.len(),
                "streaming payload"
            );
            HttpResponse::Ok()
                .insert_header((header::CONTENT_TYPE, "application/octet-stream"))
                .body(SizedStream::new(stream.len(), stream))
        }
        Err(err) => {
            tracing::error!(error = %err, "payload unavailable");
            state.status.transition(Status::Completed(Err(err)));
            HttpResponse::InternalServerError().finish()
        }
    }
}
