//! SASL mechanisms and the `LOGIN` fallback (§4.11 authentication policy).

use base64::{engine::general_purpose::STANDARD, Engine};

/// Caller-supplied credentials. Only the fields the chosen mechanism needs
/// are read.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub oauth_token: Option<String>,
    pub authzid: Option<String>,
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: Some(password.into()),
            oauth_token: None,
            authzid: None,
        }
    }

    pub fn oauth(username: impl Into<String>, token: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: None,
            oauth_token: Some(token.into()),
            authzid: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    OAuthBearer,
    XOAuth2,
    Plain,
    Login,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::OAuthBearer => "OAUTHBEARER",
            Mechanism::XOAuth2 => "XOAUTH2",
            Mechanism::Plain => "PLAIN",
            Mechanism::Login => "LOGIN",
        }
    }

    /// Picks the best mechanism the server advertises and the caller has
    /// credentials for.
    pub fn negotiate(advertised: &[&str], creds: &Credentials) -> Option<Mechanism> {
        let has = |name: &str| advertised.iter().any(|m| m.eq_ignore_ascii_case(name));
        if creds.oauth_token.is_some() {
            if has("OAUTHBEARER") {
                return Some(Mechanism::OAuthBearer);
            }
            if has("XOAUTH2") {
                return Some(Mechanism::XOAuth2);
            }
        }
        if creds.password.is_some() {
            if has("PLAIN") {
                return Some(Mechanism::Plain);
            }
            if has("LOGIN") {
                return Some(Mechanism::Login);
            }
        }
        None
    }
}

/// Builds the base64 SASL-IR initial response for the given mechanism, if
/// it has a one-shot initial response (OAUTHBEARER/XOAUTH2/PLAIN); `LOGIN`
/// is a multi-step challenge/response handled by [`LoginChallenge`]
/// instead.
pub fn initial_response(mechanism: Mechanism, creds: &Credentials) -> Option<String> {
    match mechanism {
        Mechanism::OAuthBearer => {
            let token = creds.oauth_token.as_deref()?;
            let authzid = creds.authzid.as_deref().unwrap_or(&creds.username);
            let raw = format!(
                "n,a={authzid},\x01host=unused\x01auth=Bearer {token}\x01\x01"
            );
            Some(STANDARD.encode(raw))
        }
        Mechanism::XOAuth2 => {
            let token = creds.oauth_token.as_deref()?;
            let raw = format!("user={}\x01auth=Bearer {token}\x01\x01", creds.username);
            Some(STANDARD.encode(raw))
        }
        Mechanism::Plain => {
            let password = creds.password.as_deref()?;
            let authzid = creds.authzid.as_deref().unwrap_or("");
            let raw = format!("{authzid}\x00{}\x00{password}", creds.username);
            Some(STANDARD.encode(raw))
        }
        Mechanism::Login => None,
    }
}

/// An empty continuation response, sent when the server rejects an
/// OAUTHBEARER/XOAUTH2 initial response with an error continuation rather
/// than a tagged failure (§4.11: "plus an empty continuation on error").
pub fn error_acknowledgement() -> &'static str {
    ""
}

/// Drives the two-step `AUTHENTICATE LOGIN` challenge/response: the server
/// sends base64 "Username"/"Password" prompts as continuations; this type
/// tracks which prompt has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginChallengeStep {
    AwaitingUsername,
    AwaitingPassword,
    Done,
}

#[derive(Debug)]
pub struct LoginChallenge {
    step: LoginChallengeStep,
    username: String,
    password: String,
}

impl LoginChallenge {
    pub fn new(creds: &Credentials) -> Option<Self> {
        Some(LoginChallenge {
            step: LoginChallengeStep::AwaitingUsername,
            username: creds.username.clone(),
            password: creds.password.clone()?,
        })
    }

    /// Returns the base64 payload to answer the current continuation, and
    /// advances internal state.
    pub fn respond(&mut self) -> String {
        match self.step {
            LoginChallengeStep::AwaitingUsername => {
                self.step = LoginChallengeStep::AwaitingPassword;
                STANDARD.encode(&self.username)
            }
            LoginChallengeStep::AwaitingPassword => {
                self.step = LoginChallengeStep::Done;
                STANDARD.encode(&self.password)
            }
            LoginChallengeStep::Done => String::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.step == LoginChallengeStep::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_token_prefers_oauthbearer_over_xoauth2() {
        let creds = Credentials::oauth("alice", "tok");
        let chosen = Mechanism::negotiate(&["XOAUTH2", "OAUTHBEARER", "PLAIN"], &creds);
        assert_eq!(chosen, Some(Mechanism::OAuthBearer));
    }

    #[test]
    fn password_creds_prefer_plain_over_login() {
        let creds = Credentials::password("alice", "hunter2");
        let chosen = Mechanism::negotiate(&["LOGIN", "PLAIN"], &creds);
        assert_eq!(chosen, Some(Mechanism::Plain));
    }

    #[test]
    fn plain_initial_response_is_nul_delimited_and_base64() {
        let creds = Credentials::password("alice", "hunter2");
        let resp = initial_response(Mechanism::Plain, &creds).unwrap();
        let decoded = STANDARD.decode(resp).unwrap();
        assert_eq!(decoded, b"\x00alice\x00hunter2");
    }

    #[test]
    fn login_challenge_walks_username_then_password() {
        let creds = Credentials::password("alice", "hunter2");
        let mut challenge = LoginChallenge::new(&creds).unwrap();
        assert_eq!(STANDARD.decode(challenge.respond()).unwrap(), b"alice");
        assert!(!challenge.is_done());
        assert_eq!(STANDARD.decode(challenge.respond()).unwrap(), b"hunter2");
        assert!(challenge.is_done());
    }
}
