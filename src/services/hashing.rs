use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

// m=8MB, t=2 iterations, p=1 parallelism
fn get_argon2() -> Result<Argon2<'static>, argon2::password_hash::Error> {
    let params = Params::new(8192, 2, 1, None)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = get_argon2()?.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a wrong password; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(get_argon2()?
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Returns every rule the password breaks; empty when it is acceptable.
pub fn password_policy_violations(password: &str) -> Vec<&'static str> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push("Password must be at least 12 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Password must contain a digit");
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push("Password must contain a lowercase letter");
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push("Password must contain an uppercase letter");
    }
    if password.chars().all(char::is_alphanumeric) {
        violations.push("Password must contain a symbol");
    }
    violations
}
