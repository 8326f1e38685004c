// Bearer-token authentication for the catalog API

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::api::models::ApiResponse;

/// Paths reachable without a token.
const PUBLIC_PATHS: [&str; 2] = ["/health", "/"];

/// Authentication middleware that validates Bearer tokens against the shared API secret
pub struct Auth {
    secret: Rc<str>,
}

impl Auth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Rc::from(secret.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Auth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddleware {
            service,
            secret: Rc::clone(&self.secret),
        }))
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<str>,
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let allowed = PUBLIC_PATHS.contains(&req.path())
            || bearer_token(&req).is_some_and(|token| token == &*self.secret);

        if allowed {
            let fut = self.service.call(req);
            return Box::pin(async move {
                let res = fut.await?;
                Ok(res.map_into_left_body())
            });
        }

        tracing::warn!(path = %req.path(), "rejected request without a valid token");
        Box::pin(async move {
            let response = HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error(
                    "Invalid or missing authentication token",
                ))
                .map_into_right_body();
            Ok(req.into_response(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App};

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn token_required_outside_health() {
        let app = test::init_service(
            App::new()
                .wrap(Auth::new("s3cret"))
                .route("/health", web::get().to(ok))
                .route("/api/v1/catalog/push", web::post().to(ok)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/api/v1/catalog/push").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/push")
            .insert_header((AUTHORIZATION, "Bearer wrong"))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let req = test::TestRequest::post()
            .uri("/api/v1/catalog/push")
            .insert_header((AUTHORIZATION, "Bearer s3cret"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
