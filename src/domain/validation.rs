//! Form validation for auth, wall and memory input.
//!
//! Each check returns the first failing field, matching what a form shows
//! under the offending input.

use memwall_api_types::{
    CreateMemoryData, CreateWallData, InviteUserData, LoginData, RegisterData,
    UpdateMemoryData, UpdatePasswordData, UpdateWallData,
};

use super::error::DomainError;

pub const NAME_MAX_CHARS: usize = 100;
pub const PASSWORD_MIN_CHARS: usize = 8;

/// Registration form, including the confirmation field that never leaves
/// the client.
#[derive(Debug, Clone)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn into_payload(self) -> RegisterData {
        RegisterData {
            name: self.name,
            email: self.email,
            password: self.password,
        }
    }
}

pub fn validate_login(data: &LoginData) -> Result<(), DomainError> {
    validate_email("email", &data.email)?;
    if data.password.is_empty() {
        return Err(DomainError::validation("password", "Password is required"));
    }
    Ok(())
}

pub fn validate_register(form: &RegisterForm) -> Result<(), DomainError> {
    validate_name("name", &form.name)?;
    validate_email("email", &form.email)?;
    validate_new_password("password", &form.password)?;
    if form.confirm_password.is_empty() {
        return Err(DomainError::validation(
            "confirmPassword",
            "Please confirm your password",
        ));
    }
    if form.password != form.confirm_password {
        return Err(DomainError::validation(
            "confirmPassword",
            "Passwords don't match",
        ));
    }
    Ok(())
}

pub fn validate_password_change(data: &UpdatePasswordData) -> Result<(), DomainError> {
    if data.current_password.is_empty() {
        return Err(DomainError::validation(
            "currentPassword",
            "Current password is required",
        ));
    }
    validate_new_password("newPassword", &data.new_password)
}

pub fn validate_create_wall(data: &CreateWallData) -> Result<(), DomainError> {
    validate_name("name", &data.name)
}

pub fn validate_update_wall(data: &UpdateWallData) -> Result<(), DomainError> {
    match &data.name {
        Some(name) => validate_name("name", name),
        None => Ok(()),
    }
}

pub fn validate_invite(data: &InviteUserData) -> Result<(), DomainError> {
    validate_email("email", &data.email)
}

pub fn validate_create_memory(data: &CreateMemoryData) -> Result<(), DomainError> {
    if data.title.trim().is_empty() {
        return Err(DomainError::validation("title", "Title is required"));
    }
    Ok(())
}

pub fn validate_update_memory(data: &UpdateMemoryData) -> Result<(), DomainError> {
    match &data.title {
        Some(title) if title.trim().is_empty() => {
            Err(DomainError::validation("title", "Title is required"))
        }
        _ => Ok(()),
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), DomainError> {
    let length = value.trim().chars().count();
    if length == 0 {
        return Err(DomainError::validation(field, "Name is required"));
    }
    if length > NAME_MAX_CHARS {
        return Err(DomainError::validation(field, "Name is too long"));
    }
    Ok(())
}

fn validate_email(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::validation(field, "Email is required"));
    }
    if !is_well_formed_email(value) {
        return Err(DomainError::validation(field, "Invalid email format"));
    }
    Ok(())
}

fn validate_new_password(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.chars().count() < PASSWORD_MIN_CHARS {
        return Err(DomainError::validation(
            field,
            "Password must be at least 8 characters",
        ));
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(DomainError::validation(
            field,
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace and a dot inside the domain.
fn is_well_formed_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !domain.starts_with('.'),
        None => false,
    }
}
