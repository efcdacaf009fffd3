use actix_web::{HttpResponse, Responder, get, web};

use crate::metrics::Metrics;

macros_utils::routes! {
    route health_route,
    route ready_route,
    route metrics_route,
}

/// Health check route
/// This route returns no content, the response status is enough.
#[get("/")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}

/// 200 once the poller has registered and loaded its first assignments
#[get("/ready")]
pub async fn ready_route(metrics: web::Data<Metrics>) -> impl Responder {
    if metrics.is_ready() {
        HttpResponse::Ok().body("ok")
    } else {
        HttpResponse::ServiceUnavailable().body("not ready")
    }
}

#[get("/metrics")]
pub async fn metrics_route(metrics: web::Data<Metrics>) -> impl Responder {
    HttpResponse::Ok().json(metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test};

    use super::*;

    #[actix_web::test]
    async fn test_health_route() {
        let app = test::init_service(App::new().configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_ready_route_follows_flag() {
        let metrics = Arc::new(Metrics::new());
        let app = test::init_service(
            App::new().app_data(web::Data::from(metrics.clone())).configure(routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status().as_u16(), 503);
        assert_eq!(test::read_body(resp).await, "not ready");

        metrics.set_ready(true);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/ready").to_request()).await;
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(test::read_body(resp).await, "ok");
    }

    #[actix_web::test]
    async fn test_metrics_route_serves_snapshot() {
        let metrics = Arc::new(Metrics::new());
        metrics.set_queue_depth(4);
        let app = test::init_service(
            App::new().app_data(web::Data::from(metrics.clone())).configure(routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["queue_depth"], 4);
        assert_eq!(body["ready"], false);
        assert_eq!(body["checks_executed"], 0);
    }
}
