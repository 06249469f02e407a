use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error, HttpMessage, HttpResponse, ResponseError,
};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// User ID extracted from JWT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Claims the session provider puts in its tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user id
    pub sub: String,
    /// Expiration time (unix timestamp)
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("invalid Authorization header format")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("invalid token: malformed user id")]
    InvalidSubject,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            AuthError::MissingHeader => error_codes::TOKEN_MISSING,
            _ => error_codes::TOKEN_INVALID,
        };
        HttpResponse::Unauthorized().json(ErrorResponse::for_status(
            401,
            &self.to_string(),
            kinds::AUTHENTICATION_ERROR,
            code,
        ))
    }
}

/// Validates HS256 tokens issued by the session provider
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Parse an `Authorization` header value into the caller's id
    pub fn authenticate(&self, header: Option<&str>) -> Result<UserId, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MalformedHeader)?;
        self.validate(token)
    }

    pub fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Uuid::parse_str(&data.claims.sub)
            .map(UserId)
            .map_err(|_| AuthError::InvalidSubject)
    }
}

/// JWT Authentication Middleware
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    validator: Arc<JwtValidator>,
}

impl JwtAuthMiddleware {
    pub fn new(validator: Arc<JwtValidator>) -> Self {
        Self { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            validator: self.validator.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    validator: Arc<JwtValidator>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let result = self.validator.authenticate(
            req.headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok()),
        );

        Box::pin(async move {
            let user_id = result.map_err(|e| {
                tracing::warn!(path = %req.path(), error = %e, "JWT authentication failed");
                e
            })?;

            req.extensions_mut().insert(user_id);
            service.call(req).await
        })
    }
}

/// FromRequest implementation for UserId
impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(AuthError::MissingHeader.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"test-secret";

    fn token_for(sub: &str, secret: &[u8]) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn test_valid_token_yields_user_id() {
        let id = Uuid::new_v4();
        let validator = JwtValidator::hs256(SECRET);
        let header = format!("Bearer {}", token_for(&id.to_string(), SECRET));

        assert_eq!(validator.authenticate(Some(&header)).unwrap(), UserId(id));
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let validator = JwtValidator::hs256(SECRET);

        assert!(matches!(
            validator.authenticate(None),
            Err(AuthError::MissingHeader)
        ));
        assert!(matches!(
            validator.authenticate(Some("Token abc")),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let validator = JwtValidator::hs256(SECRET);
        let token = token_for(&Uuid::new_v4().to_string(), b"other-secret");

        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        let validator = JwtValidator::hs256(SECRET);
        let token = token_for("alice", SECRET);

        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::InvalidSubject)
        ));
    }

    #[test]
    fn test_auth_error_maps_to_401() {
        assert_eq!(
            AuthError::InvalidSubject.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
