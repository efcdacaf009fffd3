//! Small declarative helpers shared by the HTTP surfaces.

#[cfg(feature = "actix")]
#[doc(hidden)]
pub use actix_web as __actix_web;

/// Generate a `routes` function registering every listed actix service.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route ready_route,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $route:ident),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::__actix_web::web::ServiceConfig) {
            $( cfg.service($route); )*
        }
    };
}

#[cfg(all(test, feature = "actix"))]
mod tests {
    use actix_web::{App, HttpResponse, Responder, get, test};

    #[get("/ping")]
    async fn ping_route() -> impl Responder {
        HttpResponse::Ok().body("pong")
    }

    #[get("/")]
    async fn root_route() -> impl Responder {
        HttpResponse::NoContent()
    }

    crate::routes! {
        route ping_route,
        route root_route,
    }

    #[actix_web::test]
    async fn test_routes_registers_every_service() {
        let app = test::init_service(App::new().configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        assert_eq!(body, "pong");

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status().as_u16(), 204);
    }
}
