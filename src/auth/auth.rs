use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub employee_id: u64,
    pub email: String,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by auth_middleware on every protected scope
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ApiError::Unauthorized("Missing token".into()))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ApiError::internal("Config missing from app data"))),
        };

        ready(
            verify_token(token, &config.jwt_secret)
                .map_err(|_| ApiError::Unauthorized("Invalid token".into()))
                .and_then(|claims| {
                    if claims.token_type != TokenType::Access {
                        return Err(ApiError::Unauthorized("Access token required".into()));
                    }
                    Ok(AuthUser {
                        employee_id: claims.employee_id,
                        email: claims.sub,
                        role: claims.role,
                    })
                }),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), ApiError> {
        if self.role.is_hr_or_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("HR/Admin only"))
        }
    }

    pub fn require_manager(&self) -> Result<(), ApiError> {
        if self.role.can_manage() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Chef/HR/Admin only"))
        }
    }

    pub fn is_hr_or_admin(&self) -> bool {
        self.role.is_hr_or_admin()
    }

    /// True when the caller is the employee or may act on any employee record.
    pub fn is_self_or_hr(&self, employee_id: u64) -> bool {
        self.employee_id == employee_id || self.is_hr_or_admin()
    }
}
