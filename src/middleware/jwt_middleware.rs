/// JWT Authentication Middleware
///
/// Runs the auth gate (and, when roles are required, the role gate) on
/// every request of the wrapped scope and injects the verified `Identity`
/// into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{AuthGate, GateOutcome, RejectKind, Role};

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    gate: AuthGate,
    required: Rc<Vec<Role>>,
}

impl JwtMiddleware {
    /// Admit any caller holding a valid access token
    pub fn new(gate: AuthGate) -> Self {
        Self {
            gate,
            required: Rc::new(Vec::new()),
        }
    }

    /// Additionally require one of `roles`
    pub fn require(mut self, roles: &[Role]) -> Self {
        self.required = Rc::new(roles.to_vec());
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            gate: self.gate.clone(),
            required: self.required.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    gate: AuthGate,
    required: Rc<Vec<Role>>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match self.gate.check(header, &self.required) {
            GateOutcome::Continue(identity) => {
                tracing::debug!(
                    user_id = %identity.user_id,
                    role = %identity.role,
                    "JWT validated successfully"
                );
                req.extensions_mut().insert(identity);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            GateOutcome::Reject { kind, error } => {
                let (code, message) = error.code_and_message();
                let body = serde_json::json!({ "error": message, "code": code });
                let response = match kind {
                    RejectKind::Unauthorized => HttpResponse::Unauthorized().json(body),
                    RejectKind::Forbidden => HttpResponse::Forbidden().json(body),
                };
                tracing::warn!(path = %req.path(), code = code, "Request rejected by auth gate");

                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response(message, response).into())
                })
            }
        }
    }
}
