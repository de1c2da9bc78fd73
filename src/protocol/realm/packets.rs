//! Realm server packet definitions and result codes.

use crate::common::error::AuthError;

/// Realm authentication result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    FailBanned,
    FailUnknownAccount,
    FailIncorrectPassword,
    FailAlreadyOnline,
    FailNoTime,
    FailDbBusy,
    FailVersionInvalid,
    FailVersionUpdate,
    FailInvalidServer,
    FailSuspended,
    FailNoAccess,
    SuccessSurvey,
    FailParentControl,
    FailLockedEnforced,
    FailTrialEnded,
    FailUseBattlenet,
    Unknown(u8),
}

impl AuthResult {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Success,
            0x03 => Self::FailBanned,
            0x04 => Self::FailUnknownAccount,
            0x05 => Self::FailIncorrectPassword,
            0x06 => Self::FailAlreadyOnline,
            0x07 => Self::FailNoTime,
            0x08 => Self::FailDbBusy,
            0x09 => Self::FailVersionInvalid,
            0x0A => Self::FailVersionUpdate,
            0x0B => Self::FailInvalidServer,
            0x0C => Self::FailSuspended,
            0x0D => Self::FailNoAccess,
            0x0E => Self::SuccessSurvey,
            0x0F => Self::FailParentControl,
            0x10 => Self::FailLockedEnforced,
            0x11 => Self::FailTrialEnded,
            0x12 => Self::FailUseBattlenet,
            other => Self::Unknown(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessSurvey)
    }

    /// Credential/ban/version failures never resolve on retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FailBanned
                | Self::FailUnknownAccount
                | Self::FailIncorrectPassword
                | Self::FailVersionInvalid
                | Self::FailVersionUpdate
                | Self::FailSuspended
                | Self::FailNoAccess
                | Self::FailParentControl
                | Self::FailLockedEnforced
                | Self::FailTrialEnded
                | Self::FailUseBattlenet
        )
    }

    pub fn message(&self) -> String {
        match self {
            Self::Success | Self::SuccessSurvey => "Success!".to_string(),
            Self::FailBanned => "Your account has been banned!".to_string(),
            Self::FailIncorrectPassword | Self::FailUnknownAccount => {
                "Incorrect username or password!".to_string()
            }
            Self::FailAlreadyOnline => {
                "Your account is already online. Wait a moment and try again!".to_string()
            }
            Self::FailVersionInvalid | Self::FailVersionUpdate => {
                "Invalid game version for this server!".to_string()
            }
            Self::FailSuspended => "Your account has been suspended!".to_string(),
            Self::FailNoAccess => {
                "Login failed! You do not have access to this server!".to_string()
            }
            Self::FailNoTime => "Account has no game time!".to_string(),
            Self::FailDbBusy => "Database is busy. Try again later!".to_string(),
            Self::FailInvalidServer => "Invalid server selected!".to_string(),
            Self::FailParentControl => {
                "Account is restricted by parental controls!".to_string()
            }
            Self::FailLockedEnforced => "Your account has been locked!".to_string(),
            Self::FailTrialEnded => "Trial period has ended!".to_string(),
            Self::FailUseBattlenet => {
                "This account must be converted before logging in!".to_string()
            }
            Self::Unknown(code) => {
                format!("Failed to login to realm server! Error code: {code:02X}")
            }
        }
    }

    /// Classified error for a non-success code.
    pub fn into_error(self) -> AuthError {
        if self.is_fatal() {
            AuthError::Fatal { reason: self.message() }
        } else {
            AuthError::Transient { reason: self.message() }
        }
    }
}

/// One entry from the realm list.
#[derive(Debug, Clone)]
pub struct RealmInfo {
    /// Realm id, forwarded to the world leg.
    pub id: u8,
    pub name: String,
    /// "host:port" as sent by the server.
    pub address: String,
}

impl RealmInfo {
    /// Parse the address into host and port; the port is taken mod 2^16.
    pub fn parse_address(&self) -> Option<(&str, u16)> {
        let (host, port) = self.address.split_once(':')?;
        let port: u32 = port.parse().ok()?;
        Some((host, (port % 0x10000) as u16))
    }
}
