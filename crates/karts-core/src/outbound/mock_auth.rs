//! Local stand-in for the authentication API.
//!
//! Every sign-in succeeds after a fixed delay and the role is guessed from the
//! email address. This is demo behavior, not an authorization rule.

use async_trait::async_trait;
use chrono::Utc;
use karts_types::domain::identity::{Identity, RegistrationData, UserRole, UserStatus};
use karts_types::ports::auth_backend::{AuthBackend, AuthError};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

const DEMO_PHONE: &str = "+1234567890";
const DEMO_FIRST_NAME: &str = "John";
const DEMO_LAST_NAME: &str = "Doe";

/// `"restaurant"` wins over `"delivery"`; anything else is a customer.
pub fn role_for_email(email: &str) -> UserRole {
    if email.contains("restaurant") {
        UserRole::RestaurantOwner
    } else if email.contains("delivery") {
        UserRole::DeliveryPartner
    } else {
        UserRole::Customer
    }
}

#[derive(Debug, Clone)]
pub struct MockAuthBackend {
    sign_in_latency: Duration,
    sign_up_latency: Duration,
}

impl MockAuthBackend {
    pub fn new(sign_in_latency: Duration, sign_up_latency: Duration) -> Self {
        Self {
            sign_in_latency,
            sign_up_latency,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sign_in_latency, config.sign_up_latency)
    }

    /// No artificial delay.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn authenticate(&self, email: &str, _password: &str) -> Result<Identity, AuthError> {
        debug!(latency_ms = self.sign_in_latency.as_millis() as u64, "mock sign-in");
        tokio::time::sleep(self.sign_in_latency).await;

        let now = Utc::now();
        Ok(Identity {
            id: Identity::generate_id(),
            email: email.to_string(),
            phone: DEMO_PHONE.into(),
            first_name: DEMO_FIRST_NAME.into(),
            last_name: DEMO_LAST_NAME.into(),
            role: role_for_email(email),
            status: UserStatus::Active,
            profile_image: None,
            email_verified: true,
            phone_verified: true,
            created_at: now,
            updated_at: now,
        })
    }

    async fn register(&self, data: RegistrationData) -> Result<Identity, AuthError> {
        debug!(latency_ms = self.sign_up_latency.as_millis() as u64, "mock sign-up");
        tokio::time::sleep(self.sign_up_latency).await;

        let now = Utc::now();
        Ok(Identity {
            id: Identity::generate_id(),
            email: data.email,
            phone: data.phone,
            first_name: data.first_name,
            last_name: data.last_name,
            role: data.role,
            status: UserStatus::Active,
            profile_image: None,
            email_verified: false,
            phone_verified: false,
            created_at: now,
            updated_at: now,
        })
    }
}
