use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::USER_AGENT,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::{error, info, warn};
use std::rc::Rc;
use std::time::Instant;

use crate::auth::Identity;

/// Request logging middleware
///
/// One line per request with method, path, status, duration, client ip,
/// user agent and, once the auth gate has run, the caller's user id.
/// 4xx responses log at warn, 5xx at error.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
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
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("-")
            .to_string();

        let service = self.service.clone();

        Box::pin(async move {
            let result = service.call(req).await;

            let elapsed = start_time.elapsed().as_millis();
            // Gate rejections arrive as errors carrying their own response.
            let (status, user_id) = match &result {
                Ok(res) => (
                    res.status(),
                    res.request()
                        .extensions()
                        .get::<Identity>()
                        .map(|identity| identity.user_id.to_string()),
                ),
                Err(e) => (e.as_response_error().status_code(), None),
            };
            let user_id = user_id.unwrap_or_else(|| "-".to_string());

            let line = format!(
                "{} {} {} {}ms ip={} ua=\"{}\" user_id={}",
                method,
                path,
                status.as_u16(),
                elapsed,
                client_ip,
                user_agent,
                user_id
            );

            if status.is_server_error() {
                error!("{}", line);
            } else if status.is_client_error() {
                warn!("{}", line);
            } else {
                info!("{}", line);
            }

            result
        })
    }
}
