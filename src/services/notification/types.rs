use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Notification kinds. The integer value is what travels on the channel and
/// must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum NotificationType {
    SignUpActivation = 1,
    SignUpCompleted = 2,
    /// Reserved for consumers that render a failed activation; nothing in
    /// this crate publishes it.
    SignUpFailure = 3,
    SignInSuccess = 4,
    SignInBlockedAccount = 5,
    DeleteAccountSuccess = 6,
    DeactivateAccountSuccess = 7,
    ChangeRoleSuccess = 8,
    ChangePasswordSuccess = 9,
    AccountActivationAdmin = 10,
    PasswordResetInitiation = 11,
    PasswordResetSuccess = 12,
    UpcomingReminder = 13,
}

impl From<NotificationType> for i32 {
    fn from(value: NotificationType) -> Self {
        value as i32
    }
}

impl TryFrom<i32> for NotificationType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use NotificationType::*;
        Ok(match value {
            1 => SignUpActivation,
            2 => SignUpCompleted,
            3 => SignUpFailure,
            4 => SignInSuccess,
            5 => SignInBlockedAccount,
            6 => DeleteAccountSuccess,
            7 => DeactivateAccountSuccess,
            8 => ChangeRoleSuccess,
            9 => ChangePasswordSuccess,
            10 => AccountActivationAdmin,
            11 => PasswordResetInitiation,
            12 => PasswordResetSuccess,
            13 => UpcomingReminder,
            other => return Err(format!("unknown notification type {}", other)),
        })
    }
}

impl NotificationType {
    pub fn default_subject(self) -> &'static str {
        use NotificationType::*;
        match self {
            SignUpActivation => "Activate your account",
            SignUpCompleted => "Welcome to Task Tracker",
            SignUpFailure => "Account activation failed",
            SignInSuccess => "New sign-in to your account",
            SignInBlockedAccount => "Your account has been locked",
            DeleteAccountSuccess => "Your account has been deleted",
            DeactivateAccountSuccess => "Your account has been deactivated",
            ChangeRoleSuccess => "Your role has changed",
            ChangePasswordSuccess => "Your password has changed",
            AccountActivationAdmin => "Your account has been activated",
            PasswordResetInitiation => "Reset your password",
            PasswordResetSuccess => "Your password has been reset",
            UpcomingReminder => "You have an upcoming Task",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub receiver: String,
    pub subject: String,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
}

impl NotificationEvent {
    pub fn new(receiver: impl Into<String>, notification_type: NotificationType) -> Self {
        Self {
            receiver: receiver.into(),
            subject: notification_type.default_subject().to_string(),
            notification_type,
            replacements: BTreeMap::new(),
        }
    }

    pub fn with_replacement(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.replacements.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("broker rejected the message: {0}")]
    Rejected(String),
    #[error("broker unavailable: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("payload could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}
