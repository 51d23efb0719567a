use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Account id is required"))]
    pub account_id: String,
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "Passwords do not match"))]
    pub confirm_new_password: String,
}
