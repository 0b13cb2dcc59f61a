use std::{
    net::IpAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use tessera::{
    authorization::AuthContext,
    clock::{Clock, ManualClock},
    common::{
        id::UserId,
        kind::TokenKind,
        user::{GeoLocation, SessionInfo, TotpEnrollment, User},
    },
    config::TokenConfig,
    extract::RequestContext,
    flow::{LoginOutcome, SecondFactor, TokenBundle},
    store::{GeoResolver, InMemoryUserStore, MailSender, UserStore},
    two_factor::{codes, TwoFactorAuthenticationToken},
    Services,
};
use time::OffsetDateTime;
use totp_rs::{Algorithm, Secret, TOTP};

pub const START: i64 = 1_700_000_000;

#[derive(Clone, Debug)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Default)]
pub struct RecordingMail {
    sent: Mutex<Vec<SentMail>>,
    fail: Mutex<bool>,
}

impl RecordingMail {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl MailSender for RecordingMail {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        _locale: Option<&str>,
    ) -> anyhow::Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(anyhow::anyhow!("smtp unreachable"));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

pub enum Geo {
    Oslo,
    Failing,
    Hanging,
}

#[async_trait]
impl GeoResolver for Geo {
    async fn resolve(&self, _ip: IpAddr) -> anyhow::Result<GeoLocation> {
        match self {
            Self::Oslo => Ok(GeoLocation {
                latitude: 59.91,
                longitude: 10.75,
                city: Some("Oslo".to_string()),
                country_code: Some("NO".to_string()),
            }),
            Self::Failing => Err(anyhow::anyhow!("lookup failed")),
            Self::Hanging => {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Err(anyhow::anyhow!("unreachable"))
            }
        }
    }
}

pub struct Fixture {
    pub services: Services,
    pub users: Arc<InMemoryUserStore>,
    pub clock: Arc<ManualClock>,
    pub mail: Arc<RecordingMail>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(TokenConfig::default(), None)
    }

    pub fn with_geo(geo: Geo) -> Self {
        let config = TokenConfig {
            geolocation_timeout_ms: 50,
            ..Default::default()
        };
        Self::build(config, Some(geo))
    }

    fn build(config: TokenConfig, geo: Option<Geo>) -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let clock = Arc::new(ManualClock::new(
            OffsetDateTime::from_unix_timestamp(START).unwrap(),
        ));
        let mail = Arc::new(RecordingMail::default());

        let mut builder = Services::builder()
            .with_config(config)
            .with_clock(clock.clone())
            .with_user_store(users.clone())
            .with_mail_sender(mail.clone());
        if let Some(geo) = geo {
            builder = builder.with_geo_resolver(Arc::new(geo));
        }

        Self {
            services: builder.build().unwrap(),
            users,
            clock,
            mail,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub async fn user(&self, email: &str) -> User {
        self.users
            .save(User::new(UserId::random(), email))
            .await
            .unwrap()
    }

    pub async fn reload(&self, user: &User) -> User {
        self.users.find_by_id(user.id).await.unwrap().unwrap()
    }

    /// A user with TOTP enrolled. Returns the base32 secret and the recovery codes.
    pub async fn totp_user(&self, email: &str) -> (User, String, Vec<String>) {
        let mut user = User::new(UserId::random(), email);
        let secret = Secret::generate_secret().to_encoded().to_string();
        let recovery_codes = codes::generate_recovery_codes();
        user.two_factor.totp = Some(TotpEnrollment {
            secret: secret.clone(),
            recovery_code_hashes: recovery_codes
                .iter()
                .filter_map(|code| codes::hash_recovery_code(user.id, code))
                .collect(),
        });
        let user = self.users.save(user).await.unwrap();
        (user, secret, recovery_codes)
    }

    pub fn totp_code(&self, secret: &str) -> String {
        totp_code(secret, self.now())
    }

    pub fn request(&self, tokens: &[(TokenKind, &str)]) -> RequestContext {
        self.request_at("/api/test", tokens)
    }

    /// A request to `path` carrying each token in its kind's `Bearer` header.
    pub fn request_at(&self, path: &str, tokens: &[(TokenKind, &str)]) -> RequestContext {
        let mut request = RequestContext::new(path);
        for (kind, value) in tokens {
            let header =
                HeaderName::from_bytes(self.services.config().kind(*kind).header.as_bytes())
                    .unwrap();
            request.headers_mut().insert(
                header,
                HeaderValue::from_str(&format!("Bearer {value}")).unwrap(),
            );
        }
        request
    }

    /// Sign in a user without a second factor.
    pub async fn login(&self, user: &User) -> TokenBundle {
        match self
            .services
            .flows()
            .after_password_verified(user.clone(), &firefox(), &self.request(&[]))
            .await
            .unwrap()
        {
            LoginOutcome::Authenticated(tokens) => tokens,
            LoginOutcome::PendingTwoFactor(_) => panic!("second factor required"),
        }
    }

    /// Start a login for a user with a second factor.
    pub async fn pending_two_factor(&self, user: &User) -> TwoFactorAuthenticationToken {
        match self
            .services
            .flows()
            .after_password_verified(user.clone(), &firefox(), &self.request(&[]))
            .await
            .unwrap()
        {
            LoginOutcome::PendingTwoFactor(token) => token,
            LoginOutcome::Authenticated(_) => panic!("second factor skipped"),
        }
    }

    /// Sign in a user with TOTP enrolled.
    pub async fn login_with_totp(&self, user: &User, secret: &str) -> TokenBundle {
        let pending = self.pending_two_factor(user).await;
        self.services
            .flows()
            .complete_two_factor(
                &self.request(&[(TokenKind::TwoFactorAuthentication, &pending.value)]),
                SecondFactor::Totp(self.totp_code(secret)),
                &firefox(),
            )
            .await
            .unwrap()
    }

    /// The authentication context of a request carrying the given tokens.
    pub async fn ctx(&self, tokens: &[(TokenKind, &str)]) -> AuthContext {
        self.services
            .authorization()
            .authenticate(self.request(tokens))
            .await
            .unwrap()
    }

    /// The context of a signed-in request, with the bundle's step-up token if any.
    pub async fn ctx_for(&self, bundle: &TokenBundle) -> AuthContext {
        let mut tokens = vec![(TokenKind::Access, bundle.access.value.as_str())];
        if let Some(step_up) = &bundle.step_up {
            tokens.push((TokenKind::StepUp, step_up.value.as_str()));
        }
        self.ctx(&tokens).await
    }
}

pub fn firefox() -> SessionInfo {
    SessionInfo {
        browser: Some("Firefox".to_string()),
        os: Some("Linux".to_string()),
    }
}

pub fn totp_code(secret: &str, now: OffsetDateTime) -> String {
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret.to_string()).to_bytes().unwrap(),
        None,
        "test".to_string(),
    )
    .unwrap()
    .generate(now.unix_timestamp() as u64)
}
