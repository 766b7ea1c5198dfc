//! Mocked phone/OTP login. Gates navigation only; no identity is verified.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, StoreError};

const MIN_PHONE_DIGITS: usize = 10;
const OTP_LENGTH: usize = 6;
const MOCK_OTP: &str = "123456";
const MOCK_TOKEN: &str = "mock-auth-token";
const RESEND_COOLDOWN: Duration = Duration::from_secs(30);
const VERIFY_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthState {
    SignedOut,
    AwaitingOtp { phone: String, sent_at: Instant },
    SignedIn { phone: String, token: String },
}

#[derive(Debug)]
pub struct AuthGate {
    state: AuthState,
    verify_delay: Duration,
}

impl Default for AuthGate {
    fn default() -> Self {
        AuthGate::new(VERIFY_DELAY)
    }
}

impl AuthGate {
    pub fn new(verify_delay: Duration) -> Self {
        AuthGate {
            state: AuthState::SignedOut,
            verify_delay,
        }
    }

    pub fn request_otp(&mut self, phone: &str) -> Result<()> {
        let phone = normalize_phone(phone)?;
        log::info!("OTP sent to {}", phone);
        self.state = AuthState::AwaitingOtp {
            phone,
            sent_at: Instant::now(),
        };
        Ok(())
    }

    /// Time left before another code may be requested.
    pub fn resend_cooldown(&self) -> Option<Duration> {
        match &self.state {
            AuthState::AwaitingOtp { sent_at, .. } => {
                RESEND_COOLDOWN.checked_sub(sent_at.elapsed()).filter(|left| !left.is_zero())
            }
            _ => None,
        }
    }

    pub fn resend_otp(&mut self) -> Result<()> {
        if let Some(left) = self.resend_cooldown() {
            return Err(StoreError::Validation(format!(
                "wait {}s before requesting another code",
                left.as_secs().max(1)
            )));
        }
        match &mut self.state {
            AuthState::AwaitingOtp { phone, sent_at } => {
                *sent_at = Instant::now();
                log::info!("OTP re-sent to {}", phone);
                Ok(())
            }
            _ => Err(StoreError::Validation("no code has been requested".to_string())),
        }
    }

    pub async fn verify_otp(&mut self, code: &str) -> Result<String> {
        let AuthState::AwaitingOtp { phone, .. } = &self.state else {
            return Err(StoreError::Auth("no code has been requested".to_string()));
        };
        let phone = phone.clone();

        let code = code.trim();
        if code.len() != OTP_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(StoreError::Validation(format!("code must be {OTP_LENGTH} digits")));
        }

        tokio::time::sleep(self.verify_delay).await;

        if code != MOCK_OTP {
            log::debug!("Rejected OTP for {}", phone);
            return Err(StoreError::Auth("invalid code".to_string()));
        }

        self.state = AuthState::SignedIn {
            phone,
            token: MOCK_TOKEN.to_string(),
        };
        Ok(MOCK_TOKEN.to_string())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::SignedIn { .. })
    }

    pub fn token(&self) -> Option<&str> {
        match &self.state {
            AuthState::SignedIn { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn phone(&self) -> Option<&str> {
        match &self.state {
            AuthState::AwaitingOtp { phone, .. } | AuthState::SignedIn { phone, .. } => Some(phone),
            AuthState::SignedOut => None,
        }
    }

    pub fn logout(&mut self) {
        self.state = AuthState::SignedOut;
    }
}

fn normalize_phone(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let body = raw.strip_prefix('+').unwrap_or(raw);
    if body.chars().any(|c| !(c.is_ascii_digit() || c == ' ' || c == '-')) {
        return Err(StoreError::Validation(format!("'{raw}' is not a phone number")));
    }

    let digits: String = body.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(StoreError::Validation("Invalid phone number".to_string()));
    }

    Ok(if raw.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    })
}
