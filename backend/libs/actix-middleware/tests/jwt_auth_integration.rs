use actix_middleware::{Claims, JwtAuthMiddleware, JwtValidator, UserId};
use actix_web::{test, web, App, HttpResponse};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use uuid::Uuid;

const SECRET: &[u8] = b"integration-secret";

async fn whoami(user: UserId) -> HttpResponse {
    HttpResponse::Ok().body(user.0.to_string())
}

fn bearer(sub: Uuid) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 600) as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
    format!("Bearer {}", token)
}

#[actix_rt::test]
async fn authenticated_request_reaches_handler_with_user_id() {
    let validator = Arc::new(JwtValidator::hs256(SECRET));
    let app = test::init_service(
        App::new()
            .wrap(JwtAuthMiddleware::new(validator))
            .route("/me", web::get().to(whoami)),
    )
    .await;

    let user = Uuid::new_v4();
    let req = test::TestRequest::get()
        .uri("/me")
        .insert_header(("Authorization", bearer(user)))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;

    assert_eq!(body, user.to_string());
}

#[actix_rt::test]
async fn missing_token_returns_401_json() {
    let validator = Arc::new(JwtValidator::hs256(SECRET));
    let app = test::init_service(
        App::new()
            .wrap(JwtAuthMiddleware::new(validator))
            .route("/me", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get().uri("/me").to_request();
    let res = test::try_call_service(&app, req).await;

    let err = match res {
        Ok(res) => panic!("expected rejection, got {}", res.status()),
        Err(err) => err,
    };
    let res = err.error_response();
    assert_eq!(res.status().as_u16(), 401);
}
