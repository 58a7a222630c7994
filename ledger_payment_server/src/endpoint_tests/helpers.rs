use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use log::debug;
use lpg_common::Secret;

use super::mocks::MockMonitor;
use crate::routes::{AdminToken, MonitorResumeRoute, MonitorStatusRoute, ADMIN_TOKEN_HEADER};

pub const TEST_ADMIN_TOKEN: &str = "operator-token-for-tests";

pub enum Method {
    Get,
    Post,
}

/// Sends one request to an app serving the operator routes, backed by `monitor`.
pub async fn operator_request(
    method: Method,
    path: &str,
    token: Option<&str>,
    configured_token: &str,
    monitor: MockMonitor,
) -> (StatusCode, String) {
    let mut req = match method {
        Method::Get => TestRequest::get(),
        Method::Post => TestRequest::post(),
    }
    .uri(path);
    if let Some(token) = token {
        req = req.insert_header((ADMIN_TOKEN_HEADER, token));
    }
    let app = App::new()
        .app_data(web::Data::new(AdminToken(Secret::new(configured_token.to_string()))))
        .app_data(web::Data::new(monitor))
        .service(
            web::scope("/api")
                .service(MonitorStatusRoute::<MockMonitor>::new())
                .service(MonitorResumeRoute::<MockMonitor>::new()),
        );
    let service = test::init_service(app).await;
    debug!("Making request to {path}");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}
