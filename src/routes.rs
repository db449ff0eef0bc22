use crate::{
    api::{
        conge, department, employee, evaluation, leave_balance, maintenance, message,
        notification, presence, project, qcm, task,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{HttpResponse, middleware::from_fn, web};
use serde_json::json;
use std::sync::Arc;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_default();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.route("/health", web::get().to(health));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(maintenance::maintenance_guard)) // needs the AuthUser
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(
                web::resource("/me/password").route(web::put().to(handlers::change_password)),
            )
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/{id}/subordinates")
                            .route(web::get().to(employee::list_subordinates)),
                    ),
            )
            .service(
                web::scope("/conges")
                    .service(
                        web::resource("")
                            .route(web::get().to(conge::list_conges))
                            .route(web::post().to(conge::create_conge)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(conge::get_conge))
                            .route(web::put().to(conge::update_conge))
                            .route(web::delete().to(conge::delete_conge)),
                    )
                    .service(
                        web::resource("/{id}/approve").route(web::put().to(conge::approve_conge)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(conge::reject_conge)),
                    )
                    .service(
                        web::resource("/{id}/documents")
                            .route(web::post().to(conge::upload_documents))
                            .route(web::get().to(conge::list_documents)),
                    ),
            )
            .service(
                web::scope("/leave-balances")
                    .service(web::resource("/me").route(web::get().to(leave_balance::my_balance)))
                    .service(
                        web::resource("/{employee_id}")
                            .route(web::get().to(leave_balance::get_balance))
                            .route(web::put().to(leave_balance::adjust_balance)),
                    )
                    .service(
                        web::resource("/{employee_id}/history")
                            .route(web::get().to(leave_balance::balance_history)),
                    ),
            )
            .service(
                web::scope("/notifications")
                    .service(
                        web::resource("").route(web::get().to(notification::list_notifications)),
                    )
                    .service(
                        web::resource("/read-all")
                            .route(web::put().to(notification::mark_all_read)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::delete().to(notification::delete_notification)),
                    )
                    .service(
                        web::resource("/{id}/read").route(web::put().to(notification::mark_read)),
                    ),
            )
            .service(
                web::scope("/departments")
                    .service(
                        web::resource("")
                            .route(web::post().to(department::create_department))
                            .route(web::get().to(department::list_departments)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(department::get_department))
                            .route(web::put().to(department::update_department))
                            .route(web::delete().to(department::delete_department)),
                    ),
            )
            .service(
                web::scope("/projects")
                    .service(
                        web::resource("")
                            .route(web::post().to(project::create_project))
                            .route(web::get().to(project::list_projects)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(project::get_project))
                            .route(web::put().to(project::update_project))
                            .route(web::delete().to(project::delete_project)),
                    )
                    .service(
                        web::resource("/{id}/tasks")
                            .route(web::get().to(project::list_project_tasks)),
                    ),
            )
            .service(
                web::scope("/tasks")
                    .service(
                        web::resource("")
                            .route(web::post().to(task::create_task))
                            .route(web::get().to(task::list_tasks)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(task::get_task))
                            .route(web::put().to(task::update_task))
                            .route(web::delete().to(task::delete_task)),
                    )
                    .service(
                        web::resource("/{id}/progress")
                            .route(web::put().to(task::update_task_progress)),
                    ),
            )
            .service(
                web::scope("/qcms")
                    .service(
                        web::resource("")
                            .route(web::post().to(qcm::create_qcm))
                            .route(web::get().to(qcm::list_qcms)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(qcm::get_qcm))
                            .route(web::delete().to(qcm::delete_qcm)),
                    )
                    .service(web::resource("/{id}/submit").route(web::post().to(qcm::submit_qcm)))
                    .service(
                        web::resource("/{id}/results").route(web::get().to(qcm::qcm_results)),
                    ),
            )
            .service(
                web::scope("/presence")
                    .service(web::resource("").route(web::get().to(presence::list_presence)))
                    .service(web::resource("/check-in").route(web::post().to(presence::check_in)))
                    .service(
                        web::resource("/check-out").route(web::post().to(presence::check_out)),
                    ),
            )
            .service(
                web::scope("/evaluations")
                    .service(
                        web::resource("")
                            .route(web::post().to(evaluation::create_evaluation))
                            .route(web::get().to(evaluation::list_evaluations)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(evaluation::get_evaluation))
                            .route(web::put().to(evaluation::update_evaluation))
                            .route(web::delete().to(evaluation::delete_evaluation)),
                    ),
            )
            .service(
                web::resource("/maintenance")
                    .route(web::get().to(maintenance::get_maintenance))
                    .route(web::put().to(maintenance::set_maintenance)),
            )
            .service(
                web::scope("/messages")
                    .service(
                        web::resource("")
                            .route(web::post().to(message::send_message))
                            .route(web::get().to(message::list_messages)),
                    )
                    .service(
                        web::resource("/{id}").route(web::delete().to(message::delete_message)),
                    )
                    .service(
                        web::resource("/{id}/read")
                            .route(web::put().to(message::mark_message_read)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, the old refresh token is revoked

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::generate_access_token,
        model::{maintenance::MaintenanceFlag, role::Role},
        service::notifier::{Mailer, Notifier},
        utils::maintenance_cache,
    };
    use actix_web::{App, http::StatusCode, test, web::Data};
    use sqlx::mysql::MySqlPoolOptions;
    use std::net::SocketAddr;

    const SECRET: &str = "route-test-secret";

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".into()),
            "DATABASE_URL" => Some("mysql://nobody@127.0.0.1:1/none".into()),
            "JWT_SECRET" => Some(SECRET.into()),
            _ => None,
        })
        .unwrap()
    }

    fn peer() -> SocketAddr {
        "10.1.2.3:4000".parse().unwrap()
    }

    fn token(employee_id: u64, role: Role) -> String {
        generate_access_token(employee_id, format!("e{employee_id}@corp.io"), role, SECRET, 300)
            .unwrap()
    }

    macro_rules! app {
        () => {{
            let config = test_config();
            // never connects: every request below is answered before a query runs
            let pool = MySqlPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap();
            let notifier = Notifier::new(pool.clone(), Mailer::LogOnly);
            let routes_config = config.clone();
            test::init_service(
                App::new()
                    .app_data(Data::new(pool))
                    .app_data(Data::new(config))
                    .app_data(Data::new(notifier))
                    .configure(move |cfg| configure(cfg, routes_config.clone())),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn health_is_public() {
        let app = app!();
        let req = test::TestRequest::get().uri("/health").peer_addr(peer()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn protected_routes_require_a_bearer_token() {
        let app = app!();
        for uri in ["/api/me", "/api/conges", "/api/leave-balances/me"] {
            let req = test::TestRequest::get().uri(uri).peer_addr(peer()).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[actix_web::test]
    async fn garbage_tokens_are_rejected() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[actix_web::test]
    async fn login_validates_before_touching_the_database() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "email": "  ", "password": "" }))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn logout_without_token_is_a_no_op() {
        let app = app!();
        let req = test::TestRequest::post().uri("/auth/logout").peer_addr(peer()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    // single test: both cases share the cached global flag
    #[actix_web::test]
    async fn maintenance_flag_gates_non_admins() {
        let app = app!();

        maintenance_cache::store(MaintenanceFlag {
            name: crate::model::maintenance::GLOBAL_FLAG.into(),
            enabled: false,
            message: None,
        })
        .await;

        // flag off: the role check inside the handler answers
        let req = test::TestRequest::delete()
            .uri("/api/employees/5")
            .insert_header(("Authorization", format!("Bearer {}", token(7, Role::Employee))))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        maintenance_cache::store(MaintenanceFlag {
            name: crate::model::maintenance::GLOBAL_FLAG.into(),
            enabled: true,
            message: Some("Upgrading".into()),
        })
        .await;

        let req = test::TestRequest::delete()
            .uri("/api/employees/5")
            .insert_header(("Authorization", format!("Bearer {}", token(7, Role::Hr))))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Upgrading");

        maintenance_cache::invalidate(crate::model::maintenance::GLOBAL_FLAG).await;
    }
}
